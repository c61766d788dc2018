//! Events pushed to live viewers, and the full-state snapshot a viewer
//! receives on subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionStats;

/// A state-change notification fanned out to dashboard viewers.
///
/// Delivery is best-effort: a disconnected viewer simply misses events
/// until it resubscribes and receives a fresh [`Snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutEvent {
  SessionStarted {
    session_id:    Uuid,
    identity_id:   Uuid,
    identity_name: String,
    room_id:       Uuid,
    started_at:    DateTime<Utc>,
    expected_end:  DateTime<Utc>,
  },
  SessionDuplicate {
    identity_id:   Uuid,
    identity_name: String,
    room_id:       Uuid,
  },
  SessionInvalid {
    /// `None` when the credential resolved to no known identity.
    identity_id:   Option<Uuid>,
    identity_name: Option<String>,
    room_id:       Uuid,
    reason:        String,
  },
  SessionAutoClosed {
    session_id:    Uuid,
    identity_id:   Uuid,
    identity_name: String,
    room_id:       Uuid,
    ended_at:      DateTime<Utc>,
  },
  PowerUpdate {
    room_id:     Uuid,
    watts:       f64,
    observed_at: DateTime<Utc>,
  },
}

impl FanoutEvent {
  /// The room this event concerns.
  pub fn room_id(&self) -> Uuid {
    match self {
      Self::SessionStarted { room_id, .. }
      | Self::SessionDuplicate { room_id, .. }
      | Self::SessionInvalid { room_id, .. }
      | Self::SessionAutoClosed { room_id, .. }
      | Self::PowerUpdate { room_id, .. } => *room_id,
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Live state of one room as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomState {
  pub room_id:           Uuid,
  pub room_name:         String,
  pub current_identity:  Option<CurrentIdentity>,
  pub started_at:        Option<DateTime<Utc>>,
  /// Seconds until the active session's expected end; `None` when no
  /// session is active.
  pub countdown_seconds: Option<i64>,
  pub current_watts:     Option<f64>,
  pub last_power_update: Option<DateTime<Utc>>,
}

/// The identity currently active in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentIdentity {
  pub identity_id:  Uuid,
  pub display_name: String,
}

/// Full current state sent to a viewer on subscribe and on `refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub rooms: Vec<RoomState>,
  pub stats: SessionStats,
}

//! Attendance sessions — the central mutable entity.
//!
//! A session is created by the validator on a qualifying scan and closed
//! only by the auto-timeout sweeper. `AutoClosed` and `Invalid` are
//! terminal; rows in those states are never touched again and nothing is
//! ever deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Lifecycle status of an attendance session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  /// Identity is currently counted as present.
  Active,
  /// Force-closed by the sweeper at its expected end time. Terminal.
  AutoClosed,
  /// Scan had no matching schedule window; kept for audit only. Terminal.
  Invalid,
}

impl SessionStatus {
  pub fn is_active(&self) -> bool {
    matches!(self, Self::Active)
  }

  /// The discriminant string stored in the `status` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::AutoClosed => "auto_closed",
      Self::Invalid => "invalid",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "auto_closed" => Ok(Self::AutoClosed),
      "invalid" => Ok(Self::Invalid),
      other => Err(crate::Error::UnknownSessionStatus(other.to_owned())),
    }
  }
}

/// One identity's presence window in one room on one date.
///
/// Invariant: at most one `Active` session exists per
/// (identity, room, date) at any instant, enforced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceSession {
  pub session_id:      Uuid,
  pub identity_id:     Uuid,
  pub room_id:         Uuid,
  pub date:            NaiveDate,
  pub started_at:      DateTime<Utc>,
  /// Set by the sweeper (to `expected_end`, not the sweep time) when the
  /// session is auto-closed. `None` while active and for invalid scans.
  pub ended_at:        Option<DateTime<Utc>>,
  pub expected_end:    Option<DateTime<Utc>>,
  pub status:          SessionStatus,
  /// The raw credential value presented at scan time, kept for audit.
  pub credential_used: String,
  pub created_at:      DateTime<Utc>,
}

/// Input to [`crate::store::SessionStore::create_session`].
/// `session_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSession {
  pub identity_id:     Uuid,
  pub room_id:         Uuid,
  pub date:            NaiveDate,
  pub started_at:      DateTime<Utc>,
  pub expected_end:    Option<DateTime<Utc>>,
  pub status:          SessionStatus,
  pub credential_used: String,
}

/// Filter parameters for [`crate::store::SessionStore::sessions`].
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
  pub date:        Option<NaiveDate>,
  pub room_id:     Option<Uuid>,
  pub identity_id: Option<Uuid>,
  pub status:      Option<SessionStatus>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// Day-level counters shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
  pub total_today: i64,
  pub active:      i64,
  pub auto_closed: i64,
  pub invalid:     i64,
}

/// Seconds until `expected_end`, clamped at zero.
///
/// Countdowns are computed at publish/snapshot time from this pure
/// function; there is no per-session timer anywhere in the system.
pub fn remaining_seconds(now: DateTime<Utc>, expected_end: DateTime<Utc>) -> i64 {
  (expected_end - now).num_seconds().max(0)
}

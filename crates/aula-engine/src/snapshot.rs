//! Snapshot assembly: the full current state a viewer receives on
//! subscribe and on explicit refresh.

use std::collections::HashMap;

use aula_core::{
  event::{CurrentIdentity, RoomState, Snapshot},
  session::{self, AttendanceSession},
  store::TelemetryStore,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Assemble the current state of every active room.
///
/// Reads committed state only, so a snapshot is always internally
/// consistent with the event stream the viewer subscribes to alongside
/// it; an event racing the snapshot is at worst reflected twice.
pub async fn current_snapshot<S: TelemetryStore>(
  store: &S,
  now: DateTime<Utc>,
) -> Result<Snapshot, S::Backend> {
  let rooms = store.active_rooms().await?;
  let mut active: HashMap<Uuid, AttendanceSession> = store
    .active_sessions()
    .await?
    .into_iter()
    .map(|s| (s.room_id, s))
    .collect();

  let mut states = Vec::with_capacity(rooms.len());
  for room in rooms {
    let session = active.remove(&room.room_id);

    let current_identity = match &session {
      Some(s) => store.identity(s.identity_id).await?.map(|i| CurrentIdentity {
        identity_id:  i.identity_id,
        display_name: i.display_name,
      }),
      None => None,
    };
    let countdown_seconds = session.as_ref().and_then(|s| {
      s.expected_end
        .map(|end| session::remaining_seconds(now, end))
    });

    let latest = store.latest_sample(room.room_id).await?;

    states.push(RoomState {
      room_id: room.room_id,
      room_name: room.name,
      current_identity,
      started_at: session.as_ref().map(|s| s.started_at),
      countdown_seconds,
      current_watts: latest.as_ref().map(|s| s.watts),
      last_power_update: latest.map(|s| s.observed_at),
    });
  }

  let stats = store.session_stats(now.date_naive()).await?;
  Ok(Snapshot {
    rooms: states,
    stats,
  })
}

//! Scan validation: turns raw credential scans into attendance sessions.

use std::sync::Arc;

use aula_core::{
  directory::Room,
  event::FanoutEvent,
  schedule::{self, ScheduleEntry},
  session::{AttendanceSession, NewSession, SessionStatus},
  store::{BackendError, TelemetryStore},
};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::hub::FanoutHub;

/// What a scan amounted to. Exactly one fanout event is published per
/// scan, matching the variant.
#[derive(Debug)]
pub enum ScanOutcome {
  /// A new active session was opened.
  Started(AttendanceSession),
  /// An active session already covers this (identity, room, date);
  /// nothing was written.
  Duplicate(AttendanceSession),
  /// The scan fell outside every scheduled window; an `invalid` session
  /// row was recorded for the audit trail.
  Invalid(AttendanceSession),
  /// The credential resolved to no known identity; nothing was written.
  UnknownCredential,
}

pub struct Validator<S> {
  store: Arc<S>,
  hub:   Arc<FanoutHub>,
  /// How early before a window's start a scan still counts.
  grace: Duration,
}

impl<S: TelemetryStore> Validator<S> {
  pub fn new(store: Arc<S>, hub: Arc<FanoutHub>, grace: Duration) -> Self {
    Self { store, hub, grace }
  }

  /// Validate one credential scan observed in `room` at `observed_at`.
  ///
  /// Storage failures propagate; every recognisable scan outcome,
  /// including rejections, is a success at this level.
  pub async fn handle_scan(
    &self,
    room: &Room,
    credential: &str,
    observed_at: DateTime<Utc>,
  ) -> Result<ScanOutcome, S::Backend> {
    let Some(identity) = self.store.identity_by_credential(credential).await?
    else {
      warn!(room = %room.name, "scan with unknown credential");
      self.hub.publish(FanoutEvent::SessionInvalid {
        identity_id:   None,
        identity_name: None,
        room_id:       room.room_id,
        reason:        "unknown credential".into(),
      });
      return Ok(ScanOutcome::UnknownCredential);
    };

    let date = observed_at.date_naive();

    // Fast path: an existing active session makes the scan a duplicate
    // without touching the schedule at all.
    if let Some(existing) = self
      .store
      .find_active(identity.identity_id, room.room_id, date)
      .await?
    {
      info!(
        identity = %identity.display_name,
        room = %room.name,
        "duplicate scan ignored"
      );
      self.hub.publish(FanoutEvent::SessionDuplicate {
        identity_id:   identity.identity_id,
        identity_name: identity.display_name,
        room_id:       room.room_id,
      });
      return Ok(ScanOutcome::Duplicate(existing));
    }

    let entries = self
      .store
      .schedules_for(
        identity.identity_id,
        room.room_id,
        schedule::weekday_of(observed_at),
      )
      .await?;
    let Some(entry) = pick_window(&entries, observed_at, self.grace) else {
      info!(
        identity = %identity.display_name,
        room = %room.name,
        at = %observed_at,
        "scan outside schedule"
      );
      let session = self
        .store
        .create_session(NewSession {
          identity_id:     identity.identity_id,
          room_id:         room.room_id,
          date,
          started_at:      observed_at,
          expected_end:    None,
          status:          SessionStatus::Invalid,
          credential_used: credential.to_owned(),
        })
        .await?;
      self.hub.publish(FanoutEvent::SessionInvalid {
        identity_id:   Some(identity.identity_id),
        identity_name: Some(identity.display_name),
        room_id:       room.room_id,
        reason:        "outside scheduled hours".into(),
      });
      return Ok(ScanOutcome::Invalid(session));
    };

    let expected_end = entry.expected_end_on(date);
    let created = self
      .store
      .create_session(NewSession {
        identity_id: identity.identity_id,
        room_id: room.room_id,
        date,
        started_at: observed_at,
        expected_end: Some(expected_end),
        status: SessionStatus::Active,
        credential_used: credential.to_owned(),
      })
      .await;

    match created {
      Ok(session) => {
        info!(
          identity = %identity.display_name,
          room = %room.name,
          until = %expected_end,
          "session started"
        );
        self.hub.publish(FanoutEvent::SessionStarted {
          session_id:    session.session_id,
          identity_id:   identity.identity_id,
          identity_name: identity.display_name,
          room_id:       room.room_id,
          started_at:    session.started_at,
          expected_end,
        });
        Ok(ScanOutcome::Started(session))
      }
      // A concurrent scan for the same triple won the race; fetch its
      // row and report this one as the duplicate.
      Err(e) if e.is_active_conflict() => {
        let existing = self
          .store
          .find_active(identity.identity_id, room.room_id, date)
          .await?;
        self.hub.publish(FanoutEvent::SessionDuplicate {
          identity_id:   identity.identity_id,
          identity_name: identity.display_name,
          room_id:       room.room_id,
        });
        match existing {
          Some(s) => Ok(ScanOutcome::Duplicate(s)),
          // The winner was swept between our insert and this read.
          None => Err(e),
        }
      }
      Err(e) => Err(e),
    }
  }
}

/// The schedule window covering `observed_at`, if any. Overlapping
/// windows are a directory misconfiguration; the latest start wins, and
/// we log so the admin can fix it.
fn pick_window(
  entries: &[ScheduleEntry],
  observed_at: DateTime<Utc>,
  grace: Duration,
) -> Option<&ScheduleEntry> {
  let mut matching: Vec<&ScheduleEntry> = entries
    .iter()
    .filter(|e| e.matches_at(observed_at, grace))
    .collect();
  if matching.len() > 1 {
    warn!(
      identity_id = %matching[0].identity_id,
      room_id = %matching[0].room_id,
      count = matching.len(),
      "overlapping schedule windows; using latest start"
    );
  }
  matching.sort_by_key(|e| e.start_time);
  matching.pop()
}

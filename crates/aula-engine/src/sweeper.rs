//! Auto-timeout sweeper: closes active sessions whose expected end has
//! passed.

use std::sync::Arc;

use aula_core::{
  event::FanoutEvent,
  session::AttendanceSession,
  store::TelemetryStore,
};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::hub::FanoutHub;

pub struct Sweeper<S> {
  store:    Arc<S>,
  hub:      Arc<FanoutHub>,
  period:   std::time::Duration,
  /// Upper bound on one sweep pass; a pass that overruns is abandoned
  /// and retried next tick rather than piling up.
  deadline: std::time::Duration,
}

impl<S: TelemetryStore> Sweeper<S> {
  pub fn new(
    store: Arc<S>,
    hub: Arc<FanoutHub>,
    period: std::time::Duration,
    deadline: std::time::Duration,
  ) -> Self {
    Self {
      store,
      hub,
      period,
      deadline,
    }
  }

  /// Run forever, sweeping once per period. Spawned as a background task
  /// by the server.
  pub async fn run(self) {
    let mut ticker = tokio::time::interval(self.period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match tokio::time::timeout(self.deadline, self.sweep(Utc::now())).await {
        Ok(Ok(closed)) if !closed.is_empty() => {
          info!(count = closed.len(), "auto-closed expired sessions");
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "sweep failed"),
        Err(_) => warn!("sweep exceeded deadline; will retry next tick"),
      }
    }
  }

  /// One sweep pass. The transition itself is a single guarded store
  /// call, so concurrent passes are safe: each expired session is
  /// returned, and announced, by exactly one caller.
  pub async fn sweep(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<AttendanceSession>, S::Backend> {
    let closed = self.store.close_expired(now).await?;
    for session in &closed {
      // The transition is already committed; a failed lookup only costs
      // this session's announcement, never the rest of the batch.
      let identity_name = match self.store.identity(session.identity_id).await {
        Ok(Some(i)) => i.display_name,
        Ok(None) => {
          warn!(session_id = %session.session_id, "closed session has no identity row");
          continue;
        }
        Err(e) => {
          error!(
            error = %e,
            session_id = %session.session_id,
            "identity lookup failed; skipping announcement"
          );
          continue;
        }
      };
      // close_expired guarantees ended_at is set on everything it returns.
      let Some(ended_at) = session.ended_at else { continue };
      self.hub.publish(FanoutEvent::SessionAutoClosed {
        session_id: session.session_id,
        identity_id: session.identity_id,
        identity_name,
        room_id: session.room_id,
        ended_at,
      });
    }
    Ok(closed)
  }
}

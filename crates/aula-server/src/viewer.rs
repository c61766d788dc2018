//! Dashboard viewer channels: live snapshots plus the fanout stream.
//!
//! A viewer subscribes *before* the snapshot is assembled, so every
//! state change is covered by one or the other; at worst an event is
//! reflected both in the snapshot and as a following message.

use axum::{
  extract::{
    Path, State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use aula_core::store::TelemetryStore;
use chrono::Utc;
use futures::{SinkExt as _, StreamExt as _, stream::SplitSink};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::AppState;

/// What slice of the fanout stream a viewer sees.
#[derive(Debug, Clone, Copy)]
enum Scope {
  Global,
  Room(Uuid),
}

#[derive(Debug, Deserialize)]
struct ViewerCommand {
  action: String,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /ws/dashboard` — every room, every event.
pub async fn global_handler<S>(
  State(state): State<AppState<S>>,
  ws: WebSocketUpgrade,
) -> Response
where
  S: TelemetryStore + 'static,
{
  ws.on_upgrade(move |socket| run(state, Scope::Global, socket))
}

/// `GET /ws/dashboard/{room_id}` — one room's events only.
pub async fn room_handler<S>(
  State(state): State<AppState<S>>,
  Path(room_id): Path<Uuid>,
  ws: WebSocketUpgrade,
) -> Response
where
  S: TelemetryStore + 'static,
{
  if let Some(status) = check_room(&state, room_id).await {
    return status.into_response();
  }
  ws.on_upgrade(move |socket| run(state, Scope::Room(room_id), socket))
}

/// `Some(status)` when a room-scoped subscription must be refused.
pub(crate) async fn check_room<S: TelemetryStore>(
  state: &AppState<S>,
  room_id: Uuid,
) -> Option<StatusCode> {
  match state.store.room(room_id).await {
    Ok(Some(_)) => None,
    Ok(None) => Some(StatusCode::NOT_FOUND),
    Err(e) => {
      error!(error = %e, "room lookup failed");
      Some(StatusCode::INTERNAL_SERVER_ERROR)
    }
  }
}

// ─── Session loop ────────────────────────────────────────────────────────────

async fn run<S: TelemetryStore>(
  state: AppState<S>,
  scope: Scope,
  socket: WebSocket,
) {
  // Subscribe first; events published while the snapshot is assembled
  // queue up in the channel instead of being lost.
  let mut rx = match scope {
    Scope::Global => state.hub.subscribe_global(),
    Scope::Room(room_id) => state.hub.subscribe_room(room_id),
  };
  let (mut tx, mut inbound) = socket.split();

  if !send_snapshot(&state, &mut tx).await {
    return;
  }

  loop {
    tokio::select! {
      event = rx.recv() => match event {
        Ok(event) => {
          let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
              error!(error = %e, "event serialisation failed");
              continue;
            }
          };
          if tx.send(Message::Text(json.into())).await.is_err() {
            break;
          }
        }
        // Fell behind the broadcast backlog; a fresh snapshot is
        // cheaper than replaying what was missed.
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, "viewer lagged; resending snapshot");
          if !send_snapshot(&state, &mut tx).await {
            break;
          }
        }
        Err(RecvError::Closed) => break,
      },
      msg = inbound.next() => match msg {
        Some(Ok(Message::Text(text))) => {
          match serde_json::from_str::<ViewerCommand>(text.as_str()) {
            Ok(cmd) if cmd.action == "refresh" => {
              if !send_snapshot(&state, &mut tx).await {
                break;
              }
            }
            Ok(cmd) => debug!(action = %cmd.action, "ignoring unknown viewer action"),
            Err(_) => debug!("ignoring malformed viewer message"),
          }
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => {}
        Some(Err(_)) => break,
      },
    }
  }
}

/// Assemble and send the full current state. Returns `false` when the
/// connection is no longer worth keeping.
async fn send_snapshot<S: TelemetryStore>(
  state: &AppState<S>,
  tx: &mut SplitSink<WebSocket, Message>,
) -> bool {
  let snapshot =
    match aula_engine::current_snapshot(state.store.as_ref(), Utc::now()).await {
      Ok(snapshot) => snapshot,
      Err(e) => {
        error!(error = %e, "snapshot assembly failed");
        return false;
      }
    };
  let payload = json!({
    "type":  "initial_data",
    "rooms": snapshot.rooms,
    "stats": snapshot.stats,
  });
  tx.send(Message::Text(payload.to_string().into()))
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::Arc;

  use aula_store_sqlite::SqliteStore;

  use crate::ServerConfig;

  async fn state_with_room() -> (AppState<SqliteStore>, Uuid) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let room = store.add_room("Room 101", "dev-101", "tok", true).await.unwrap();
    (
      AppState::new(Arc::new(store), ServerConfig::default()),
      room.room_id,
    )
  }

  #[tokio::test]
  async fn known_room_is_accepted() {
    let (state, room_id) = state_with_room().await;
    assert_eq!(check_room(&state, room_id).await, None);
  }

  #[tokio::test]
  async fn unknown_room_is_not_found() {
    let (state, _) = state_with_room().await;
    assert_eq!(
      check_room(&state, Uuid::new_v4()).await,
      Some(StatusCode::NOT_FOUND)
    );
  }
}

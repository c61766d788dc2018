//! Device ingestion gateway: one WebSocket per room device.
//!
//! Auth happens before the upgrade; a socket that exists is already
//! authenticated. Devices batch readings: one message may carry a
//! credential scan, a power reading, or both, and each message gets an
//! ack so firmware can tell a dead link from a slow one.

use axum::{
  extract::{
    Path, Query, State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use aula_core::{directory::Room, energy::NewPowerSample, store::TelemetryStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
  pub token: String,
}

/// One inbound device message. Both payload fields absent is a
/// heartbeat.
#[derive(Debug, Deserialize)]
pub struct DeviceMessage {
  pub credential:  Option<String>,
  pub watts:       Option<f64>,
  /// When the device observed the reading; defaults to arrival time for
  /// firmware without a clock.
  pub observed_at: Option<DateTime<Utc>>,
}

/// Per-message acknowledgement sent back to the device.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
  pub status:    String,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message:   Option<String>,
}

impl Ack {
  fn ok() -> Self {
    Self {
      status:    "ok".to_string(),
      timestamp: Utc::now(),
      message:   None,
    }
  }

  fn error(message: String) -> Self {
    Self {
      status:    "error".to_string(),
      timestamp: Utc::now(),
      message:   Some(message),
    }
  }
}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// `GET /ws/device/{room_id}?token=...`
///
/// Unknown room, inactive room, and token mismatch are all the same 403:
/// a probing client learns nothing about which rooms exist.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Path(room_id): Path<Uuid>,
  Query(params): Query<DeviceQuery>,
  ws: WebSocketUpgrade,
) -> Response
where
  S: TelemetryStore + 'static,
{
  let room = match authorize(&state, room_id, &params.token).await {
    Ok(room) => room,
    Err(status) => return status.into_response(),
  };

  info!(room = %room.name, device = %room.device_id, "device connected");
  ws.on_upgrade(move |socket| run(state, room, socket))
}

/// Resolve and authenticate a device connect, before any upgrade.
pub(crate) async fn authorize<S: TelemetryStore>(
  state: &AppState<S>,
  room_id: Uuid,
  token: &str,
) -> Result<Room, StatusCode> {
  let room = match state.store.room(room_id).await {
    Ok(Some(room)) => room,
    Ok(None) => {
      warn!(%room_id, "device connect for unknown room");
      return Err(StatusCode::FORBIDDEN);
    }
    Err(e) => {
      error!(error = %e, "room lookup failed");
      return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
  };
  if !room.active || room.device_token != token {
    warn!(room = %room.name, "device connect rejected");
    return Err(StatusCode::FORBIDDEN);
  }
  Ok(room)
}

async fn run<S: TelemetryStore>(
  state: AppState<S>,
  room: Room,
  mut socket: WebSocket,
) {
  let read_timeout = state.config.read_timeout();
  loop {
    let msg = match tokio::time::timeout(read_timeout, socket.recv()).await {
      // No heartbeat within the window: the device is gone, close our
      // side rather than hold the socket forever.
      Err(_) => {
        info!(room = %room.name, "device idle past timeout; closing");
        let _ = socket.send(Message::Close(None)).await;
        break;
      }
      Ok(None) => break,
      Ok(Some(Err(_))) => break,
      Ok(Some(Ok(msg))) => msg,
    };

    match msg {
      Message::Text(text) => {
        let ack = process_text(&state, &room, text.as_str()).await;
        let json = match serde_json::to_string(&ack) {
          Ok(json) => json,
          Err(e) => {
            error!(error = %e, "ack serialisation failed");
            break;
          }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
          break;
        }
      }
      Message::Close(_) => break,
      // Pings are answered by axum; binary frames are not part of the
      // device protocol.
      _ => {}
    }
  }
  info!(room = %room.name, device = %room.device_id, "device disconnected");
}

/// Handle one device message and produce its ack.
///
/// The scan is processed before the power reading, so a batched message
/// opens the session first and the power update lands in a room that
/// already shows its occupant.
pub(crate) async fn process_text<S: TelemetryStore>(
  state: &AppState<S>,
  room: &Room,
  text: &str,
) -> Ack {
  let msg: DeviceMessage = match serde_json::from_str(text) {
    Ok(msg) => msg,
    Err(e) => {
      warn!(room = %room.name, error = %e, "malformed device message");
      return Ack::error(format!("malformed message: {e}"));
    }
  };
  let observed_at = msg.observed_at.unwrap_or_else(Utc::now);

  if let Some(credential) = &msg.credential
    && let Err(e) = state
      .validator
      .handle_scan(room, credential, observed_at)
      .await
  {
    error!(error = %e, room = %room.name, "scan processing failed");
    return Ack::error("scan not recorded".to_string());
  }

  if let Some(watts) = msg.watts
    && let Err(e) = state
      .aggregator
      .handle_sample(NewPowerSample {
        room_id: room.room_id,
        watts,
        observed_at,
      })
      .await
  {
    error!(error = %e, room = %room.name, "sample processing failed");
    return Ack::error("sample not recorded".to_string());
  }

  Ack::ok()
}

//! Handlers for `/sessions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sessions` | optional `date`, `room_id`, `identity_id`, `status`, `limit`, `offset` |
//! | `GET`  | `/sessions/active` | every currently-active session |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use aula_core::{
  session::{AttendanceSession, SessionQuery, SessionStatus},
  store::TelemetryStore,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub date:        Option<NaiveDate>,
  pub room_id:     Option<Uuid>,
  pub identity_id: Option<Uuid>,
  /// `active`, `auto_closed`, or `invalid`.
  pub status:      Option<String>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// `GET /sessions?date=...&room_id=...&identity_id=...&status=...`
pub async fn list<S: TelemetryStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AttendanceSession>>, ApiError> {
  let status = params
    .status
    .as_deref()
    .map(SessionStatus::parse)
    .transpose()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let sessions = store
    .sessions(SessionQuery {
      date: params.date,
      room_id: params.room_id,
      identity_id: params.identity_id,
      status,
      limit: params.limit,
      offset: params.offset,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(sessions))
}

/// `GET /sessions/active`
pub async fn active<S: TelemetryStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<AttendanceSession>>, ApiError> {
  let sessions = store.active_sessions().await.map_err(ApiError::store)?;
  Ok(Json(sessions))
}

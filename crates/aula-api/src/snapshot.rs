//! `GET /snapshot` — the REST twin of the WebSocket initial snapshot.

use std::sync::Arc;

use axum::{Json, extract::State};
use aula_core::{event::Snapshot, store::TelemetryStore};
use chrono::Utc;

use crate::error::ApiError;

pub async fn handler<S: TelemetryStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Snapshot>, ApiError> {
  let snapshot = aula_engine::current_snapshot(store.as_ref(), Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(snapshot))
}

//! Handlers for `/energy` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/energy/rollups` | `room_id`, `granularity`, `from`, `to` all required |
//! | `GET`  | `/energy/latest` | latest power sample per active room |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use aula_core::{
  energy::{EnergyBucket, Granularity, PowerSample},
  store::TelemetryStore,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RollupParams {
  pub room_id:     Uuid,
  /// `hour`, `day`, or `month`.
  pub granularity: String,
  /// Inclusive lower bound on `period_start`.
  pub from:        DateTime<Utc>,
  /// Exclusive upper bound on `period_start`.
  pub to:          DateTime<Utc>,
}

/// `GET /energy/rollups?room_id=...&granularity=...&from=...&to=...`
pub async fn rollups<S: TelemetryStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<RollupParams>,
) -> Result<Json<Vec<EnergyBucket>>, ApiError> {
  let granularity = Granularity::parse(&params.granularity)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let buckets = store
    .buckets(params.room_id, granularity, params.from, params.to)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(buckets))
}

/// `GET /energy/latest` — rooms that have never reported are omitted.
pub async fn latest<S: TelemetryStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<PowerSample>>, ApiError> {
  let rooms = store.active_rooms().await.map_err(ApiError::store)?;
  let mut samples = Vec::with_capacity(rooms.len());
  for room in rooms {
    if let Some(sample) = store
      .latest_sample(room.room_id)
      .await
      .map_err(ApiError::store)?
    {
      samples.push(sample);
    }
  }
  Ok(Json(samples))
}

//! JSON REST API for Aula.
//!
//! Exposes an axum [`Router`] backed by any
//! [`aula_core::store::TelemetryStore`]. Read-only: writes happen through
//! the device gateway, never through HTTP.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", aula_api::api_router(store.clone()))
//! ```

pub mod energy;
pub mod error;
pub mod sessions;
pub mod snapshot;

use std::sync::Arc;

use aula_core::store::TelemetryStore;
use axum::{Router, routing::get};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router
/// regardless of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: TelemetryStore + 'static,
{
  Router::new()
    .route("/sessions", get(sessions::list::<S>))
    .route("/sessions/active", get(sessions::active::<S>))
    .route("/energy/rollups", get(energy::rollups::<S>))
    .route("/energy/latest", get(energy::latest::<S>))
    .route("/snapshot", get(snapshot::handler::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests {
  use super::*;

  use aula_core::{
    energy::{Granularity, NewPowerSample},
    session::{NewSession, SessionStatus},
    store::{EnergyStore, SessionStore},
  };
  use aula_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use chrono::{DateTime, Utc};
  use serde_json::Value;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
  }

  /// One room, one identity, one active and one invalid session on
  /// 2026-03-02, plus a pair of power samples and an hour bucket.
  async fn seeded() -> (Arc<SqliteStore>, Uuid, Uuid) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let identity = store.add_identity("Alice", Some("CARD-1")).await.unwrap();
    let room = store.add_room("Room 101", "dev-101", "tok", true).await.unwrap();

    store
      .create_session(NewSession {
        identity_id:     identity.identity_id,
        room_id:         room.room_id,
        date:            "2026-03-02".parse().unwrap(),
        started_at:      at("2026-03-02T08:05:00Z"),
        expected_end:    Some(at("2026-03-02T10:00:00Z")),
        status:          SessionStatus::Active,
        credential_used: "CARD-1".into(),
      })
      .await
      .unwrap();
    store
      .create_session(NewSession {
        identity_id:     identity.identity_id,
        room_id:         room.room_id,
        date:            "2026-03-02".parse().unwrap(),
        started_at:      at("2026-03-02T13:00:00Z"),
        expected_end:    None,
        status:          SessionStatus::Invalid,
        credential_used: "CARD-1".into(),
      })
      .await
      .unwrap();

    store
      .append_sample(NewPowerSample {
        room_id:     room.room_id,
        watts:       150.0,
        observed_at: at("2026-03-02T09:00:00Z"),
      })
      .await
      .unwrap();
    store
      .apply_bucket_sample(
        room.room_id,
        Granularity::Hour,
        at("2026-03-02T09:00:00Z"),
        150.0,
        0.015,
      )
      .await
      .unwrap();

    (Arc::new(store), room.room_id, identity.identity_id)
  }

  async fn get_json(store: Arc<SqliteStore>, uri: &str) -> (StatusCode, Value) {
    let resp = api_router(store)
      .oneshot(Request::get(uri).body(Body::empty()).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
  }

  #[tokio::test]
  async fn sessions_list_filters_by_status() {
    let (store, _, _) = seeded().await;

    let (status, body) = get_json(store.clone(), "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get_json(store, "/sessions?status=invalid").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "invalid");
  }

  #[tokio::test]
  async fn sessions_list_rejects_unknown_status() {
    let (store, _, _) = seeded().await;
    let (status, body) = get_json(store, "/sessions?status=paused").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("paused"));
  }

  #[tokio::test]
  async fn sessions_active_lists_only_active() {
    let (store, room_id, _) = seeded().await;
    let (status, body) = get_json(store, "/sessions/active").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["room_id"], room_id.to_string());
  }

  #[tokio::test]
  async fn rollups_returns_buckets_in_range() {
    let (store, room_id, _) = seeded().await;
    let uri = format!(
      "/energy/rollups?room_id={room_id}&granularity=hour\
       &from=2026-03-02T00:00:00Z&to=2026-03-03T00:00:00Z"
    );
    let (status, body) = get_json(store, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sample_count"], 1);
  }

  #[tokio::test]
  async fn rollups_rejects_unknown_granularity() {
    let (store, room_id, _) = seeded().await;
    let uri = format!(
      "/energy/rollups?room_id={room_id}&granularity=week\
       &from=2026-03-02T00:00:00Z&to=2026-03-03T00:00:00Z"
    );
    let (status, _) = get_json(store, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn latest_reports_one_sample_per_room() {
    let (store, room_id, _) = seeded().await;
    let (status, body) = get_json(store, "/energy/latest").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["room_id"], room_id.to_string());
    assert_eq!(rows[0]["watts"], 150.0);
  }

  #[tokio::test]
  async fn snapshot_includes_room_state_and_stats() {
    let (store, _, _) = seeded().await;
    let (status, body) = get_json(store, "/snapshot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rooms"][0]["room_name"], "Room 101");
    assert_eq!(body["stats"]["active"], 1);
  }
}

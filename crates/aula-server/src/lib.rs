//! WebSocket and HTTP surface for Aula.
//!
//! Exposes an axum [`Router`] with the device ingestion gateway, the
//! dashboard viewer channels, and the nested `/api` query surface, all
//! backed by any [`aula_core::store::TelemetryStore`].

pub mod device;
pub mod viewer;

use std::{path::PathBuf, sync::Arc, time::Duration};

use aula_core::store::TelemetryStore;
use aula_engine::{Aggregator, FanoutHub, Sweeper, Validator};
use axum::{Router, routing::get};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
/// Every field has a default so an empty file is a valid config.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_db_path")]
  pub db_path:             PathBuf,
  /// How often the sweeper looks for expired sessions.
  #[serde(default = "default_sweep_period_secs")]
  pub sweep_period_secs:   u64,
  /// Upper bound on a single sweep pass.
  #[serde(default = "default_sweep_deadline_secs")]
  pub sweep_deadline_secs: u64,
  /// How early before a scheduled window a scan still counts.
  #[serde(default = "default_grace_minutes")]
  pub grace_minutes:       i64,
  /// Sample gaps longer than this contribute no energy.
  #[serde(default = "default_gap_ceiling_minutes")]
  pub gap_ceiling_minutes: i64,
  /// A device socket idle longer than this is closed.
  #[serde(default = "default_read_timeout_secs")]
  pub read_timeout_secs:   u64,
  /// Per-channel fanout backlog before slow viewers lag.
  #[serde(default = "default_fanout_capacity")]
  pub fanout_capacity:     usize,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}
fn default_port() -> u16 {
  8900
}
fn default_db_path() -> PathBuf {
  PathBuf::from("aula.db")
}
fn default_sweep_period_secs() -> u64 {
  60
}
fn default_sweep_deadline_secs() -> u64 {
  20
}
fn default_grace_minutes() -> i64 {
  15
}
fn default_gap_ceiling_minutes() -> i64 {
  10
}
fn default_read_timeout_secs() -> u64 {
  90
}
fn default_fanout_capacity() -> usize {
  256
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                default_host(),
      port:                default_port(),
      db_path:             default_db_path(),
      sweep_period_secs:   default_sweep_period_secs(),
      sweep_deadline_secs: default_sweep_deadline_secs(),
      grace_minutes:       default_grace_minutes(),
      gap_ceiling_minutes: default_gap_ceiling_minutes(),
      read_timeout_secs:   default_read_timeout_secs(),
      fanout_capacity:     default_fanout_capacity(),
    }
  }
}

impl ServerConfig {
  pub fn grace(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.grace_minutes)
  }

  pub fn gap_ceiling(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.gap_ceiling_minutes)
  }

  pub fn sweep_period(&self) -> Duration {
    Duration::from_secs(self.sweep_period_secs)
  }

  pub fn sweep_deadline(&self) -> Duration {
    Duration::from_secs(self.sweep_deadline_secs)
  }

  pub fn read_timeout(&self) -> Duration {
    Duration::from_secs(self.read_timeout_secs)
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub hub:        Arc<FanoutHub>,
  pub validator:  Arc<Validator<S>>,
  pub aggregator: Arc<Aggregator<S>>,
  pub config:     Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      hub:        self.hub.clone(),
      validator:  self.validator.clone(),
      aggregator: self.aggregator.clone(),
      config:     self.config.clone(),
    }
  }
}

impl<S: TelemetryStore> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
    let config = Arc::new(config);
    let hub = Arc::new(FanoutHub::new(config.fanout_capacity));
    let validator = Arc::new(Validator::new(
      store.clone(),
      hub.clone(),
      config.grace(),
    ));
    let aggregator = Arc::new(Aggregator::new(
      store.clone(),
      hub.clone(),
      config.gap_ceiling(),
    ));
    Self {
      store,
      hub,
      validator,
      aggregator,
      config,
    }
  }

  /// A sweeper wired to this state's store and hub, ready to spawn.
  pub fn sweeper(&self) -> Sweeper<S> {
    Sweeper::new(
      self.store.clone(),
      self.hub.clone(),
      self.config.sweep_period(),
      self.config.sweep_deadline(),
    )
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full axum [`Router`]: device gateway, viewer channels, and
/// the nested REST API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: TelemetryStore + 'static,
{
  let api = aula_api::api_router(state.store.clone());
  Router::new()
    .route("/ws/device/{room_id}", get(device::handler::<S>))
    .route("/ws/dashboard", get(viewer::global_handler::<S>))
    .route("/ws/dashboard/{room_id}", get(viewer::room_handler::<S>))
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ───────────────────────────────────────────────────────

// The WebSocket auth paths are covered directly in `device::tests` and
// `viewer::tests`; the upgrade handshake itself needs a live connection
// and is not exercised here.

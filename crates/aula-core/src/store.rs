//! Store traits implemented by storage backends (e.g. `aula-store-sqlite`).
//!
//! The engine and API crates depend on these abstractions, not on any
//! concrete backend. All methods return `Send` futures so the traits can
//! be used in multi-threaded async runtimes (tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  directory::{Identity, Room},
  energy::{EnergyBucket, Granularity, NewPowerSample, PowerSample},
  schedule::ScheduleEntry,
  session::{AttendanceSession, NewSession, SessionQuery, SessionStats},
};

// ─── Sessions ────────────────────────────────────────────────────────────────

/// Durable table of attendance sessions, mutated in place across their
/// lifecycle.
///
/// Implementations must uphold the single-active invariant: at most one
/// `Active` session per (identity, room, date). `create_session` for a
/// triple that already has an active row must fail with an error whose
/// [`BackendError::is_active_conflict`] is true; that failure is the
/// compare-and-swap boundary protecting concurrent scan handlers.
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new session. `session_id` and `created_at` are assigned by
  /// the store.
  fn create_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<AttendanceSession, Self::Error>> + Send + '_;

  /// The active session for (identity, room, date), if any.
  fn find_active(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<AttendanceSession>, Self::Error>> + Send + '_;

  /// Atomically transition every active session with `expected_end <= now`
  /// to `AutoClosed`, setting `ended_at` to its `expected_end`.
  ///
  /// Returns the sessions actually transitioned by *this* call. Guarded so
  /// that a concurrent sweep sees zero rows — running it twice with no new
  /// expirations is a no-op.
  fn close_expired(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<AttendanceSession>, Self::Error>> + Send + '_;

  /// Filtered session listing for the report collaborators.
  fn sessions(
    &self,
    query: SessionQuery,
  ) -> impl Future<Output = Result<Vec<AttendanceSession>, Self::Error>> + Send + '_;

  /// All currently-active sessions, across all rooms.
  fn active_sessions(
    &self,
  ) -> impl Future<Output = Result<Vec<AttendanceSession>, Self::Error>> + Send + '_;

  /// Dashboard counters for one calendar date.
  fn session_stats(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<SessionStats, Self::Error>> + Send + '_;
}

// ─── Energy ──────────────────────────────────────────────────────────────────

/// Append-only power-sample ledger plus derived rollup buckets.
pub trait EnergyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append a raw sample to the ledger. Never rejected for ordering; late
  /// samples land in the ledger like any other.
  fn append_sample(
    &self,
    input: NewPowerSample,
  ) -> impl Future<Output = Result<PowerSample, Self::Error>> + Send + '_;

  /// The latest sample for `room_id` observed strictly before `before`.
  /// This is the integration predecessor, correct for late arrivals too.
  fn previous_sample(
    &self,
    room_id: Uuid,
    before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<PowerSample>, Self::Error>> + Send + '_;

  /// Fold one sample's wattage and energy contribution into the bucket at
  /// (room, granularity, period_start), creating it if absent.
  fn apply_bucket_sample(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    period_start: DateTime<Utc>,
    watts: f64,
    kwh: f64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recent sample for a room, if any.
  fn latest_sample(
    &self,
    room_id: Uuid,
  ) -> impl Future<Output = Result<Option<PowerSample>, Self::Error>> + Send + '_;

  /// Rollup buckets for a room and granularity with
  /// `period_start ∈ [from, to)`, ordered by period.
  fn buckets(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<EnergyBucket>, Self::Error>> + Send + '_;
}

// ─── Directory / schedule index ──────────────────────────────────────────────

/// Read-only lookups against the admin-owned directory: identities,
/// rooms, and the schedule index.
pub trait ScheduleIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Resolve a scan credential to its identity, if bound.
  fn identity_by_credential<'a>(
    &'a self,
    credential: &'a str,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + 'a;

  fn identity(
    &self,
    identity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  fn room(
    &self,
    room_id: Uuid,
  ) -> impl Future<Output = Result<Option<Room>, Self::Error>> + Send + '_;

  /// All rooms with the active flag set, ordered by name.
  fn active_rooms(
    &self,
  ) -> impl Future<Output = Result<Vec<Room>, Self::Error>> + Send + '_;

  /// Schedule entries for (identity, room) on a weekday (0 = Monday).
  fn schedules_for(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    weekday: u8,
  ) -> impl Future<Output = Result<Vec<ScheduleEntry>, Self::Error>> + Send + '_;
}

/// Implemented by backend error types so generic callers can classify
/// failures without knowing the concrete backend.
pub trait BackendError: std::error::Error + Send + Sync + 'static {
  /// Whether this error is the single-active uniqueness guard firing.
  /// Scan handlers map it to the duplicate outcome instead of failing.
  fn is_active_conflict(&self) -> bool;
}

/// Everything the engine needs from a backend, in one bound.
pub trait TelemetryStore:
  SessionStore<Error = <Self as TelemetryStore>::Backend>
  + EnergyStore<Error = <Self as TelemetryStore>::Backend>
  + ScheduleIndex<Error = <Self as TelemetryStore>::Backend>
{
  type Backend: BackendError;
}

impl<T, E> TelemetryStore for T
where
  E: BackendError,
  T: SessionStore<Error = E> + EnergyStore<Error = E> + ScheduleIndex<Error = E>,
{
  type Backend = E;
}

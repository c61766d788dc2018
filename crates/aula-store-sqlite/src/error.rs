//! Error type for `aula-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aula_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The single-active-session index rejected a second active row for the
  /// same (identity, room, date).
  #[error(
    "an active session already exists for identity {identity_id} in room \
     {room_id} on {date}"
  )]
  ActiveSessionExists {
    identity_id: uuid::Uuid,
    room_id:     uuid::Uuid,
    date:        chrono::NaiveDate,
  },

  #[error("room not found: {0}")]
  RoomNotFound(uuid::Uuid),
}

impl Error {
  /// Whether this error is the active-session uniqueness guard firing.
  /// Scan handlers map it to the duplicate outcome.
  pub fn is_active_conflict(&self) -> bool {
    matches!(self, Self::ActiveSessionExists { .. })
  }
}

impl aula_core::store::BackendError for Error {
  fn is_active_conflict(&self) -> bool {
    Error::is_active_conflict(self)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for `aula-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("room not found: {0}")]
  RoomNotFound(Uuid),

  #[error("identity not found: {0}")]
  IdentityNotFound(Uuid),

  #[error(
    "an active session already exists for identity {identity_id} in room \
     {room_id} on {date}"
  )]
  ActiveSessionExists {
    identity_id: Uuid,
    room_id:     Uuid,
    date:        chrono::NaiveDate,
  },

  #[error("unknown session status: {0:?}")]
  UnknownSessionStatus(String),

  #[error("unknown granularity: {0:?}")]
  UnknownGranularity(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

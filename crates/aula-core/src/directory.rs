//! Identities and rooms — the read-only directory the core validates
//! against.
//!
//! Both entities are owned by the external admin collaborator. The core
//! never creates, updates, or deletes them; it only resolves credentials
//! and device tokens.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person who can be scanned in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
  pub identity_id:  Uuid,
  pub display_name: String,
  /// The scan credential bound to this identity. `None` until the admin
  /// assigns one.
  pub credential:   Option<String>,
}

/// A physical space bound to exactly one edge device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
  pub room_id:      Uuid,
  pub name:         String,
  pub device_id:    String,
  /// Bearer token the device presents at connect time. Consumed by the
  /// ingestion gateway; never exposed on the query surface.
  #[serde(skip_serializing)]
  pub device_token: String,
  pub active:       bool,
}

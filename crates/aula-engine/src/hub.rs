//! Fanout hub: broadcast channels carrying [`FanoutEvent`]s to viewers.
//!
//! Two scopes. The global channel carries every event; per-room channels
//! carry only events for that room and are created lazily on first use.
//! Delivery is best-effort: a viewer that falls behind sees a `Lagged`
//! error on its receiver and is expected to resubscribe for a fresh
//! snapshot.

use std::{collections::HashMap, sync::RwLock};

use aula_core::event::FanoutEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct FanoutHub {
  capacity: usize,
  global:   broadcast::Sender<FanoutEvent>,
  rooms:    RwLock<HashMap<Uuid, broadcast::Sender<FanoutEvent>>>,
}

impl FanoutHub {
  /// `capacity` is the per-channel backlog before slow receivers lag.
  pub fn new(capacity: usize) -> Self {
    let (global, _) = broadcast::channel(capacity);
    Self {
      capacity,
      global,
      rooms: RwLock::new(HashMap::new()),
    }
  }

  /// Publish an event to its room's channel and to the global channel.
  ///
  /// A send error just means no viewer is currently subscribed on that
  /// scope; the event is dropped there, which is the intended semantics.
  pub fn publish(&self, event: FanoutEvent) {
    let room_id = event.room_id();
    if let Some(tx) = self
      .rooms
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(&room_id)
    {
      let _ = tx.send(event.clone());
    }
    let _ = self.global.send(event);
  }

  /// Subscribe to every event, across all rooms.
  pub fn subscribe_global(&self) -> broadcast::Receiver<FanoutEvent> {
    self.global.subscribe()
  }

  /// Subscribe to a single room's events, creating the channel if this
  /// is the room's first subscriber.
  pub fn subscribe_room(&self, room_id: Uuid) -> broadcast::Receiver<FanoutEvent> {
    let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
    rooms
      .entry(room_id)
      .or_insert_with(|| broadcast::channel(self.capacity).0)
      .subscribe()
  }
}

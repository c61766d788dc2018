//! Engine tests against the in-memory SQLite backend.

use std::sync::Arc;

use aula_core::{
  directory::{Identity, Room},
  energy::{EnergyBucket, Granularity, NewPowerSample, PowerSample},
  event::FanoutEvent,
  schedule::ScheduleEntry,
  session::{AttendanceSession, NewSession, SessionQuery, SessionStats, SessionStatus},
  store::{EnergyStore, ScheduleIndex, SessionStore},
};
use aula_store_sqlite::{Error as StoreError, SqliteStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  Aggregator, FanoutHub, ScanOutcome, Sweeper, Validator, current_snapshot,
};

fn at(s: &str) -> DateTime<Utc> {
  s.parse().unwrap()
}

struct Fixture {
  store:    Arc<SqliteStore>,
  hub:      Arc<FanoutHub>,
  room:     Room,
  identity: Uuid,
}

/// Alice holds CARD-1 and is scheduled in Room 101 on Mondays,
/// 08:00-10:00. All test scans happen on Monday 2026-03-02.
async fn fixture() -> Fixture {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let identity = store.add_identity("Alice Reyes", Some("CARD-1")).await.unwrap();
  let room = store.add_room("Room 101", "dev-101", "tok-101", true).await.unwrap();
  store
    .add_schedule(
      identity.identity_id,
      room.room_id,
      0,
      "08:00:00".parse().unwrap(),
      "10:00:00".parse().unwrap(),
    )
    .await
    .unwrap();
  Fixture {
    store: Arc::new(store),
    hub: Arc::new(FanoutHub::new(16)),
    room,
    identity: identity.identity_id,
  }
}

fn validator(f: &Fixture) -> Validator<SqliteStore> {
  Validator::new(f.store.clone(), f.hub.clone(), Duration::minutes(15))
}

fn aggregator(f: &Fixture) -> Aggregator<SqliteStore> {
  Aggregator::new(f.store.clone(), f.hub.clone(), Duration::minutes(10))
}

fn sweeper(f: &Fixture) -> Sweeper<SqliteStore> {
  Sweeper::new(
    f.store.clone(),
    f.hub.clone(),
    std::time::Duration::from_secs(30),
    std::time::Duration::from_secs(10),
  )
}

// ─── Validator ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_in_window_starts_session() {
  let f = fixture().await;
  let mut rx = f.hub.subscribe_global();

  let outcome = validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();

  let ScanOutcome::Started(session) = outcome else {
    panic!("expected Started, got {outcome:?}");
  };
  assert_eq!(session.status, SessionStatus::Active);
  assert_eq!(session.expected_end, Some(at("2026-03-02T10:00:00Z")));
  assert_eq!(session.credential_used, "CARD-1");

  match rx.try_recv().unwrap() {
    FanoutEvent::SessionStarted {
      identity_name,
      expected_end,
      ..
    } => {
      assert_eq!(identity_name, "Alice Reyes");
      assert_eq!(expected_end, at("2026-03-02T10:00:00Z"));
    }
    other => panic!("expected SessionStarted, got {other:?}"),
  }
}

#[tokio::test]
async fn repeated_scan_is_a_duplicate() {
  let f = fixture().await;
  let v = validator(&f);

  v.handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();
  let outcome = v
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:30:00Z"))
    .await
    .unwrap();
  assert!(matches!(outcome, ScanOutcome::Duplicate(_)), "{outcome:?}");

  // Only the first scan produced a row.
  let all = f.store.sessions(SessionQuery::default()).await.unwrap();
  assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn scan_outside_schedule_records_invalid_session() {
  let f = fixture().await;
  let mut rx = f.hub.subscribe_room(f.room.room_id);

  let outcome = validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T13:00:00Z"))
    .await
    .unwrap();

  let ScanOutcome::Invalid(session) = outcome else {
    panic!("expected Invalid, got {outcome:?}");
  };
  assert_eq!(session.status, SessionStatus::Invalid);
  assert!(session.expected_end.is_none());

  match rx.try_recv().unwrap() {
    FanoutEvent::SessionInvalid {
      identity_id,
      reason,
      ..
    } => {
      assert_eq!(identity_id, Some(f.identity));
      assert!(reason.contains("schedule"), "reason: {reason}");
    }
    other => panic!("expected SessionInvalid, got {other:?}"),
  }
}

#[tokio::test]
async fn unknown_credential_writes_nothing() {
  let f = fixture().await;
  let mut rx = f.hub.subscribe_global();

  let outcome = validator(&f)
    .handle_scan(&f.room, "CARD-404", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();
  assert!(matches!(outcome, ScanOutcome::UnknownCredential), "{outcome:?}");

  assert!(f.store.sessions(SessionQuery::default()).await.unwrap().is_empty());
  match rx.try_recv().unwrap() {
    FanoutEvent::SessionInvalid { identity_id, .. } => {
      assert_eq!(identity_id, None);
    }
    other => panic!("expected SessionInvalid, got {other:?}"),
  }
}

#[tokio::test]
async fn overlapping_windows_latest_start_wins() {
  let f = fixture().await;
  // A second, overlapping Monday window ending later.
  f.store
    .add_schedule(
      f.identity,
      f.room.room_id,
      0,
      "09:00:00".parse().unwrap(),
      "11:00:00".parse().unwrap(),
    )
    .await
    .unwrap();

  let outcome = validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T09:30:00Z"))
    .await
    .unwrap();
  let ScanOutcome::Started(session) = outcome else {
    panic!("expected Started, got {outcome:?}");
  };
  assert_eq!(session.expected_end, Some(at("2026-03-02T11:00:00Z")));
}

// ─── Sweeper ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_closes_expired_and_announces() {
  let f = fixture().await;
  validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();

  let mut rx = f.hub.subscribe_global();
  let s = sweeper(&f);

  let closed = s.sweep(at("2026-03-02T10:04:00Z")).await.unwrap();
  assert_eq!(closed.len(), 1);
  assert_eq!(closed[0].status, SessionStatus::AutoClosed);

  match rx.try_recv().unwrap() {
    FanoutEvent::SessionAutoClosed {
      identity_name,
      ended_at,
      ..
    } => {
      assert_eq!(identity_name, "Alice Reyes");
      // Closed at the scheduled end, not at sweep time.
      assert_eq!(ended_at, at("2026-03-02T10:00:00Z"));
    }
    other => panic!("expected SessionAutoClosed, got {other:?}"),
  }

  // A second pass finds nothing and announces nothing.
  assert!(s.sweep(at("2026-03-02T10:05:00Z")).await.unwrap().is_empty());
  assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn sweep_leaves_running_sessions_alone() {
  let f = fixture().await;
  validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();

  let closed = sweeper(&f).sweep(at("2026-03-02T09:00:00Z")).await.unwrap();
  assert!(closed.is_empty());
}

/// Delegates to the shared SQLite store but fails every identity lookup,
/// standing in for a directory that is temporarily unreadable.
struct UnreadableDirectory(Arc<SqliteStore>);

impl SessionStore for UnreadableDirectory {
  type Error = StoreError;

  async fn create_session(
    &self,
    input: NewSession,
  ) -> Result<AttendanceSession, StoreError> {
    self.0.create_session(input).await
  }

  async fn find_active(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    date: NaiveDate,
  ) -> Result<Option<AttendanceSession>, StoreError> {
    self.0.find_active(identity_id, room_id, date).await
  }

  async fn close_expired(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<AttendanceSession>, StoreError> {
    self.0.close_expired(now).await
  }

  async fn sessions(
    &self,
    query: SessionQuery,
  ) -> Result<Vec<AttendanceSession>, StoreError> {
    self.0.sessions(query).await
  }

  async fn active_sessions(&self) -> Result<Vec<AttendanceSession>, StoreError> {
    self.0.active_sessions().await
  }

  async fn session_stats(&self, date: NaiveDate) -> Result<SessionStats, StoreError> {
    self.0.session_stats(date).await
  }
}

impl EnergyStore for UnreadableDirectory {
  type Error = StoreError;

  async fn append_sample(
    &self,
    input: NewPowerSample,
  ) -> Result<PowerSample, StoreError> {
    self.0.append_sample(input).await
  }

  async fn previous_sample(
    &self,
    room_id: Uuid,
    before: DateTime<Utc>,
  ) -> Result<Option<PowerSample>, StoreError> {
    self.0.previous_sample(room_id, before).await
  }

  async fn apply_bucket_sample(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    period_start: DateTime<Utc>,
    watts: f64,
    kwh: f64,
  ) -> Result<(), StoreError> {
    self
      .0
      .apply_bucket_sample(room_id, granularity, period_start, watts, kwh)
      .await
  }

  async fn latest_sample(&self, room_id: Uuid) -> Result<Option<PowerSample>, StoreError> {
    self.0.latest_sample(room_id).await
  }

  async fn buckets(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<EnergyBucket>, StoreError> {
    self.0.buckets(room_id, granularity, from, to).await
  }
}

impl ScheduleIndex for UnreadableDirectory {
  type Error = StoreError;

  async fn identity_by_credential(
    &self,
    credential: &str,
  ) -> Result<Option<Identity>, StoreError> {
    self.0.identity_by_credential(credential).await
  }

  async fn identity(&self, _identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
    Err(StoreError::DateParse("directory unavailable".to_string()))
  }

  async fn room(&self, room_id: Uuid) -> Result<Option<Room>, StoreError> {
    self.0.room(room_id).await
  }

  async fn active_rooms(&self) -> Result<Vec<Room>, StoreError> {
    self.0.active_rooms().await
  }

  async fn schedules_for(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    weekday: u8,
  ) -> Result<Vec<ScheduleEntry>, StoreError> {
    self.0.schedules_for(identity_id, room_id, weekday).await
  }
}

#[tokio::test]
async fn sweep_commits_even_when_identity_lookup_fails() {
  let f = fixture().await;
  validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();

  let mut rx = f.hub.subscribe_global();
  let s = Sweeper::new(
    Arc::new(UnreadableDirectory(f.store.clone())),
    f.hub.clone(),
    std::time::Duration::from_secs(30),
    std::time::Duration::from_secs(10),
  );

  // The pass reports the committed transition; only the announcement is
  // lost.
  let closed = s.sweep(at("2026-03-02T10:04:00Z")).await.unwrap();
  assert_eq!(closed.len(), 1);
  assert_eq!(closed[0].status, SessionStatus::AutoClosed);
  assert!(rx.try_recv().is_err());

  // The shared database saw the close.
  let all = f.store.sessions(SessionQuery::default()).await.unwrap();
  assert_eq!(all[0].status, SessionStatus::AutoClosed);
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn samples_integrate_into_buckets() {
  let f = fixture().await;
  let a = aggregator(&f);
  let mut rx = f.hub.subscribe_room(f.room.room_id);

  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:00:00Z"),
  })
  .await
  .unwrap();
  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       200.0,
    observed_at: at("2026-03-02T09:06:00Z"),
  })
  .await
  .unwrap();

  // 150 W average over 6 minutes = 0.015 kWh, contributed by the second
  // sample only; the first had no predecessor.
  let hour = at("2026-03-02T09:00:00Z");
  let buckets = f
    .store
    .buckets(f.room.room_id, Granularity::Hour, hour, hour + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(buckets.len(), 1);
  let b = &buckets[0];
  assert!((b.total_kwh - 0.015).abs() < 1e-9, "total {}", b.total_kwh);
  assert_eq!(b.sample_count, 2);
  assert!((b.avg_watts - 150.0).abs() < 1e-9);
  assert_eq!(b.max_watts, 200.0);
  assert_eq!(b.min_watts, 100.0);

  // The day bucket carries the same energy.
  let day = at("2026-03-02T00:00:00Z");
  let daily = f
    .store
    .buckets(f.room.room_id, Granularity::Day, day, day + Duration::days(1))
    .await
    .unwrap();
  assert!((daily[0].total_kwh - 0.015).abs() < 1e-9);

  // Both samples were fanned out live.
  for expected in [100.0, 200.0] {
    match rx.try_recv().unwrap() {
      FanoutEvent::PowerUpdate { watts, .. } => assert_eq!(watts, expected),
      other => panic!("expected PowerUpdate, got {other:?}"),
    }
  }
}

#[tokio::test]
async fn gap_beyond_ceiling_contributes_no_energy() {
  let f = fixture().await;
  let a = aggregator(&f);

  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:00:00Z"),
  })
  .await
  .unwrap();
  // 20 minutes later, past the 10-minute ceiling.
  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:20:00Z"),
  })
  .await
  .unwrap();

  let hour = at("2026-03-02T09:00:00Z");
  let buckets = f
    .store
    .buckets(f.room.room_id, Granularity::Hour, hour, hour + Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(buckets[0].total_kwh, 0.0);
  assert_eq!(buckets[0].sample_count, 2);
}

#[tokio::test]
async fn late_sample_integrates_against_true_predecessor() {
  let f = fixture().await;
  let a = aggregator(&f);

  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:00:00Z"),
  })
  .await
  .unwrap();
  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:06:00Z"),
  })
  .await
  .unwrap();
  // Arrives last but was observed between the two: its predecessor is
  // the 09:00 sample, 3 minutes earlier.
  a.handle_sample(NewPowerSample {
    room_id:     f.room.room_id,
    watts:       100.0,
    observed_at: at("2026-03-02T09:03:00Z"),
  })
  .await
  .unwrap();

  let hour = at("2026-03-02T09:00:00Z");
  let buckets = f
    .store
    .buckets(f.room.room_id, Granularity::Hour, hour, hour + Duration::hours(1))
    .await
    .unwrap();
  // 0.01 (first interval) + 0.005 (late sample's 3 minutes) = 0.015.
  assert!(
    (buckets[0].total_kwh - 0.015).abs() < 1e-9,
    "total {}",
    buckets[0].total_kwh
  );
  assert_eq!(buckets[0].sample_count, 3);
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_reflects_sessions_and_power() {
  let f = fixture().await;
  validator(&f)
    .handle_scan(&f.room, "CARD-1", at("2026-03-02T08:05:00Z"))
    .await
    .unwrap();
  aggregator(&f)
    .handle_sample(NewPowerSample {
      room_id:     f.room.room_id,
      watts:       123.0,
      observed_at: at("2026-03-02T08:10:00Z"),
    })
    .await
    .unwrap();

  let snap = current_snapshot(f.store.as_ref(), at("2026-03-02T09:00:00Z"))
    .await
    .unwrap();
  assert_eq!(snap.rooms.len(), 1);

  let room = &snap.rooms[0];
  assert_eq!(room.room_name, "Room 101");
  let who = room.current_identity.as_ref().unwrap();
  assert_eq!(who.display_name, "Alice Reyes");
  assert_eq!(room.started_at, Some(at("2026-03-02T08:05:00Z")));
  assert_eq!(room.countdown_seconds, Some(3600));
  assert_eq!(room.current_watts, Some(123.0));
  assert_eq!(room.last_power_update, Some(at("2026-03-02T08:10:00Z")));

  assert_eq!(snap.stats.total_today, 1);
  assert_eq!(snap.stats.active, 1);
}

#[tokio::test]
async fn snapshot_shows_idle_rooms_as_empty() {
  let f = fixture().await;
  let snap = current_snapshot(f.store.as_ref(), at("2026-03-02T09:00:00Z"))
    .await
    .unwrap();

  let room = &snap.rooms[0];
  assert!(room.current_identity.is_none());
  assert!(room.countdown_seconds.is_none());
  assert!(room.current_watts.is_none());
  assert_eq!(snap.stats.active, 0);
}

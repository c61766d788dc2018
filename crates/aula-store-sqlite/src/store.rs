//! [`SqliteStore`] — the SQLite implementation of the Aula store traits.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use aula_core::{
  directory::{Identity, Room},
  energy::{EnergyBucket, Granularity, NewPowerSample, PowerSample},
  schedule::ScheduleEntry,
  session::{AttendanceSession, NewSession, SessionQuery, SessionStats},
  store::{EnergyStore, ScheduleIndex, SessionStore},
};

use crate::{
  encode::{
    RawBucket, RawIdentity, RawRoom, RawSample, RawSchedule, RawSession,
    encode_date, encode_dt, encode_time, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

const SESSION_COLUMNS: &str = "session_id, identity_id, room_id, date, \
   started_at, ended_at, expected_end, status, credential_used, created_at";

const SAMPLE_COLUMNS: &str =
  "sample_id, room_id, watts, observed_at, created_at";

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
  Ok(RawSession {
    session_id:      row.get(0)?,
    identity_id:     row.get(1)?,
    room_id:         row.get(2)?,
    date:            row.get(3)?,
    started_at:      row.get(4)?,
    ended_at:        row.get(5)?,
    expected_end:    row.get(6)?,
    status:          row.get(7)?,
    credential_used: row.get(8)?,
    created_at:      row.get(9)?,
  })
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSample> {
  Ok(RawSample {
    sample_id:   row.get(0)?,
    room_id:     row.get(1)?,
    watts:       row.get(2)?,
    observed_at: row.get(3)?,
    created_at:  row.get(4)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Aula store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Provisioning writes ───────────────────────────────────────────────
  //
  // Directory rows are owned by the external admin collaborator; these
  // helpers exist for that collaborator and for tests, and are
  // deliberately not part of the core store traits.

  pub async fn add_identity(
    &self,
    display_name: &str,
    credential: Option<&str>,
  ) -> Result<Identity> {
    let identity = Identity {
      identity_id:  Uuid::new_v4(),
      display_name: display_name.to_owned(),
      credential:   credential.map(str::to_owned),
    };

    let id_str = encode_uuid(identity.identity_id);
    let name   = identity.display_name.clone();
    let cred   = identity.credential.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO identities (identity_id, display_name, credential)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, cred],
        )?;
        Ok(())
      })
      .await?;

    Ok(identity)
  }

  pub async fn add_room(
    &self,
    name: &str,
    device_id: &str,
    device_token: &str,
    active: bool,
  ) -> Result<Room> {
    let room = Room {
      room_id:      Uuid::new_v4(),
      name:         name.to_owned(),
      device_id:    device_id.to_owned(),
      device_token: device_token.to_owned(),
      active,
    };

    let id_str = encode_uuid(room.room_id);
    let name   = room.name.clone();
    let dev    = room.device_id.clone();
    let token  = room.device_token.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rooms (room_id, name, device_id, device_token, active)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, dev, token, active],
        )?;
        Ok(())
      })
      .await?;

    Ok(room)
  }

  pub async fn add_schedule(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    weekday: u8,
    start_time: NaiveTime,
    end_time: NaiveTime,
  ) -> Result<ScheduleEntry> {
    let entry = ScheduleEntry {
      schedule_id: Uuid::new_v4(),
      identity_id,
      room_id,
      weekday,
      start_time,
      end_time,
    };

    let id_str       = encode_uuid(entry.schedule_id);
    let identity_str = encode_uuid(identity_id);
    let room_str     = encode_uuid(room_id);
    let start_str    = encode_time(start_time);
    let end_str      = encode_time(end_time);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO schedules
             (schedule_id, identity_id, room_id, weekday, start_time, end_time)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            identity_str,
            room_str,
            weekday,
            start_str,
            end_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(entry)
  }
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = Error;

  async fn create_session(
    &self,
    input: NewSession,
  ) -> Result<AttendanceSession> {
    let session = AttendanceSession {
      session_id:      Uuid::new_v4(),
      identity_id:     input.identity_id,
      room_id:         input.room_id,
      date:            input.date,
      started_at:      input.started_at,
      ended_at:        None,
      expected_end:    input.expected_end,
      status:          input.status,
      credential_used: input.credential_used,
      created_at:      Utc::now(),
    };

    let session_id_str  = encode_uuid(session.session_id);
    let identity_id_str = encode_uuid(session.identity_id);
    let room_id_str     = encode_uuid(session.room_id);
    let date_str        = encode_date(session.date);
    let started_str     = encode_dt(session.started_at);
    let expected_str    = session.expected_end.map(encode_dt);
    let status_str      = session.status.as_str();
    let credential      = session.credential_used.clone();
    let created_str     = encode_dt(session.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attendance_sessions (
             session_id, identity_id, room_id, date, started_at,
             ended_at, expected_end, status, credential_used, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            session_id_str,
            identity_id_str,
            room_id_str,
            date_str,
            started_str,
            expected_str,
            status_str,
            credential,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await;

    match inserted {
      Ok(()) => Ok(session),
      // The partial unique index fired: someone else won the race for
      // this (identity, room, date). Surface it as the typed conflict.
      Err(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
        e,
        _,
      ))) if e.code == rusqlite::ErrorCode::ConstraintViolation
        && session.status.is_active() =>
      {
        Err(Error::ActiveSessionExists {
          identity_id: session.identity_id,
          room_id:     session.room_id,
          date:        session.date,
        })
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn find_active(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    date: NaiveDate,
  ) -> Result<Option<AttendanceSession>> {
    let identity_str = encode_uuid(identity_id);
    let room_str     = encode_uuid(room_id);
    let date_str     = encode_date(date);

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SESSION_COLUMNS} FROM attendance_sessions
                 WHERE identity_id = ?1 AND room_id = ?2 AND date = ?3
                   AND status = 'active'"
              ),
              rusqlite::params![identity_str, room_str, date_str],
              session_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn close_expired(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<AttendanceSession>> {
    let now_str = encode_dt(now);

    // A single guarded UPDATE: atomic, and a no-op for rows another sweep
    // already transitioned.
    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "UPDATE attendance_sessions
              SET status = 'auto_closed', ended_at = expected_end
            WHERE status = 'active'
              AND expected_end IS NOT NULL
              AND expected_end <= ?1
          RETURNING {SESSION_COLUMNS}"
        ))?;

        let rows = stmt
          .query_map(rusqlite::params![now_str], session_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  async fn sessions(
    &self,
    query: SessionQuery,
  ) -> Result<Vec<AttendanceSession>> {
    let date_str     = query.date.map(encode_date);
    let room_str     = query.room_id.map(encode_uuid);
    let identity_str = query.identity_id.map(encode_uuid);
    let status_str   = query.status.map(|s| s.as_str().to_owned());
    let limit_val    = query.limit.unwrap_or(500) as i64;
    let offset_val   = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        // Build WHERE clause dynamically; placeholders keep their fixed
        // indices whether or not each filter is present.
        let mut conds: Vec<&'static str> = vec![];
        if date_str.is_some() {
          conds.push("date = ?1");
        }
        if room_str.is_some() {
          conds.push("room_id = ?2");
        }
        if identity_str.is_some() {
          conds.push("identity_id = ?3");
        }
        if status_str.is_some() {
          conds.push("status = ?4");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT {SESSION_COLUMNS} FROM attendance_sessions
           {where_clause}
           ORDER BY date DESC, started_at DESC
           LIMIT ?5 OFFSET ?6"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              date_str.as_deref(),
              room_str.as_deref(),
              identity_str.as_deref(),
              status_str.as_deref(),
              limit_val,
              offset_val,
            ],
            session_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  async fn active_sessions(&self) -> Result<Vec<AttendanceSession>> {
    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SESSION_COLUMNS} FROM attendance_sessions
           WHERE status = 'active'
           ORDER BY started_at"
        ))?;
        let rows = stmt
          .query_map([], session_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  async fn session_stats(&self, date: NaiveDate) -> Result<SessionStats> {
    let date_str = encode_date(date);

    let stats = self
      .conn
      .call(move |conn| {
        let total_today: i64 = conn.query_row(
          "SELECT COUNT(*) FROM attendance_sessions WHERE date = ?1",
          rusqlite::params![date_str],
          |r| r.get(0),
        )?;
        let active: i64 = conn.query_row(
          "SELECT COUNT(*) FROM attendance_sessions WHERE status = 'active'",
          [],
          |r| r.get(0),
        )?;
        let auto_closed: i64 = conn.query_row(
          "SELECT COUNT(*) FROM attendance_sessions
           WHERE date = ?1 AND status = 'auto_closed'",
          rusqlite::params![date_str],
          |r| r.get(0),
        )?;
        let invalid: i64 = conn.query_row(
          "SELECT COUNT(*) FROM attendance_sessions
           WHERE date = ?1 AND status = 'invalid'",
          rusqlite::params![date_str],
          |r| r.get(0),
        )?;
        Ok(SessionStats { total_today, active, auto_closed, invalid })
      })
      .await?;

    Ok(stats)
  }
}

// ─── EnergyStore impl ────────────────────────────────────────────────────────

impl EnergyStore for SqliteStore {
  type Error = Error;

  async fn append_sample(&self, input: NewPowerSample) -> Result<PowerSample> {
    let sample = PowerSample {
      sample_id:   Uuid::new_v4(),
      room_id:     input.room_id,
      watts:       input.watts,
      observed_at: input.observed_at,
      created_at:  Utc::now(),
    };

    let sample_id_str = encode_uuid(sample.sample_id);
    let room_id_str   = encode_uuid(sample.room_id);
    let watts         = sample.watts;
    let observed_str  = encode_dt(sample.observed_at);
    let created_str   = encode_dt(sample.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO power_samples
             (sample_id, room_id, watts, observed_at, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            sample_id_str,
            room_id_str,
            watts,
            observed_str,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(sample)
  }

  async fn previous_sample(
    &self,
    room_id: Uuid,
    before: DateTime<Utc>,
  ) -> Result<Option<PowerSample>> {
    let room_str   = encode_uuid(room_id);
    let before_str = encode_dt(before);

    let raw: Option<RawSample> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SAMPLE_COLUMNS} FROM power_samples
                 WHERE room_id = ?1 AND observed_at < ?2
                 ORDER BY observed_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![room_str, before_str],
              sample_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSample::into_sample).transpose()
  }

  async fn apply_bucket_sample(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    period_start: DateTime<Utc>,
    watts: f64,
    kwh: f64,
  ) -> Result<()> {
    let room_str   = encode_uuid(room_id);
    let gran_str   = granularity.as_str();
    let period_str = encode_dt(period_start);

    // Running average folds against the pre-update sample_count; SQLite
    // evaluates the SET expressions against the original row.
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO energy_buckets (
             room_id, granularity, period_start,
             total_kwh, avg_watts, max_watts, min_watts, sample_count
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, 1)
           ON CONFLICT (room_id, granularity, period_start) DO UPDATE SET
             total_kwh    = total_kwh + excluded.total_kwh,
             avg_watts    = (avg_watts * sample_count + excluded.avg_watts)
                            / (sample_count + 1),
             max_watts    = MAX(max_watts, excluded.max_watts),
             min_watts    = MIN(min_watts, excluded.min_watts),
             sample_count = sample_count + 1",
          rusqlite::params![room_str, gran_str, period_str, kwh, watts],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn latest_sample(&self, room_id: Uuid) -> Result<Option<PowerSample>> {
    let room_str = encode_uuid(room_id);

    let raw: Option<RawSample> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SAMPLE_COLUMNS} FROM power_samples
                 WHERE room_id = ?1
                 ORDER BY observed_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![room_str],
              sample_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSample::into_sample).transpose()
  }

  async fn buckets(
    &self,
    room_id: Uuid,
    granularity: Granularity,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<EnergyBucket>> {
    let room_str = encode_uuid(room_id);
    let gran_str = granularity.as_str();
    let from_str = encode_dt(from);
    let to_str   = encode_dt(to);

    let raws: Vec<RawBucket> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT room_id, granularity, period_start,
                  total_kwh, avg_watts, max_watts, min_watts, sample_count
           FROM energy_buckets
           WHERE room_id = ?1 AND granularity = ?2
             AND period_start >= ?3 AND period_start < ?4
           ORDER BY period_start",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![room_str, gran_str, from_str, to_str],
            |row| {
              Ok(RawBucket {
                room_id:      row.get(0)?,
                granularity:  row.get(1)?,
                period_start: row.get(2)?,
                total_kwh:    row.get(3)?,
                avg_watts:    row.get(4)?,
                max_watts:    row.get(5)?,
                min_watts:    row.get(6)?,
                sample_count: row.get(7)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBucket::into_bucket).collect()
  }
}

// ─── ScheduleIndex impl ──────────────────────────────────────────────────────

impl ScheduleIndex for SqliteStore {
  type Error = Error;

  async fn identity_by_credential(
    &self,
    credential: &str,
  ) -> Result<Option<Identity>> {
    let cred = credential.to_owned();

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT identity_id, display_name, credential
               FROM identities WHERE credential = ?1",
              rusqlite::params![cred],
              |row| {
                Ok(RawIdentity {
                  identity_id:  row.get(0)?,
                  display_name: row.get(1)?,
                  credential:   row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn identity(&self, identity_id: Uuid) -> Result<Option<Identity>> {
    let id_str = encode_uuid(identity_id);

    let raw: Option<RawIdentity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT identity_id, display_name, credential
               FROM identities WHERE identity_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawIdentity {
                  identity_id:  row.get(0)?,
                  display_name: row.get(1)?,
                  credential:   row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }

  async fn room(&self, room_id: Uuid) -> Result<Option<Room>> {
    let id_str = encode_uuid(room_id);

    let raw: Option<RawRoom> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT room_id, name, device_id, device_token, active
               FROM rooms WHERE room_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawRoom {
                  room_id:      row.get(0)?,
                  name:         row.get(1)?,
                  device_id:    row.get(2)?,
                  device_token: row.get(3)?,
                  active:       row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRoom::into_room).transpose()
  }

  async fn active_rooms(&self) -> Result<Vec<Room>> {
    let raws: Vec<RawRoom> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT room_id, name, device_id, device_token, active
           FROM rooms WHERE active = 1 ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawRoom {
              room_id:      row.get(0)?,
              name:         row.get(1)?,
              device_id:    row.get(2)?,
              device_token: row.get(3)?,
              active:       row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRoom::into_room).collect()
  }

  async fn schedules_for(
    &self,
    identity_id: Uuid,
    room_id: Uuid,
    weekday: u8,
  ) -> Result<Vec<ScheduleEntry>> {
    let identity_str = encode_uuid(identity_id);
    let room_str     = encode_uuid(room_id);

    let raws: Vec<RawSchedule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT schedule_id, identity_id, room_id, weekday,
                  start_time, end_time
           FROM schedules
           WHERE identity_id = ?1 AND room_id = ?2 AND weekday = ?3
           ORDER BY start_time",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![identity_str, room_str, weekday],
            |row| {
              Ok(RawSchedule {
                schedule_id: row.get(0)?,
                identity_id: row.get(1)?,
                room_id:     row.get(2)?,
                weekday:     row.get(3)?,
                start_time:  row.get(4)?,
                end_time:    row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSchedule::into_entry).collect()
  }
}

//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (UTC, so string order
//! matches time order for the sweep comparison). Dates are `YYYY-MM-DD`,
//! times `HH:MM:SS`, UUIDs hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use aula_core::{
  directory::{Identity, Room},
  energy::{EnergyBucket, Granularity, PowerSample},
  schedule::ScheduleEntry,
  session::{AttendanceSession, SessionStatus},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Ok(Uuid::parse_str(s)?)
}

// ─── Date / time ─────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String {
  d.format("%Y-%m-%d").to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|e: chrono::ParseError| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String {
  t.format("%H:%M:%S").to_string()
}

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  s.parse().map_err(|e: chrono::ParseError| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `attendance_sessions` row.
pub struct RawSession {
  pub session_id:      String,
  pub identity_id:     String,
  pub room_id:         String,
  pub date:            String,
  pub started_at:      String,
  pub ended_at:        Option<String>,
  pub expected_end:    Option<String>,
  pub status:          String,
  pub credential_used: String,
  pub created_at:      String,
}

impl RawSession {
  pub fn into_session(self) -> Result<AttendanceSession> {
    Ok(AttendanceSession {
      session_id:      decode_uuid(&self.session_id)?,
      identity_id:     decode_uuid(&self.identity_id)?,
      room_id:         decode_uuid(&self.room_id)?,
      date:            decode_date(&self.date)?,
      started_at:      decode_dt(&self.started_at)?,
      ended_at:        self.ended_at.as_deref().map(decode_dt).transpose()?,
      expected_end:    self.expected_end.as_deref().map(decode_dt).transpose()?,
      status:          SessionStatus::parse(&self.status).map_err(Error::Core)?,
      credential_used: self.credential_used,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `power_samples` row.
pub struct RawSample {
  pub sample_id:   String,
  pub room_id:     String,
  pub watts:       f64,
  pub observed_at: String,
  pub created_at:  String,
}

impl RawSample {
  pub fn into_sample(self) -> Result<PowerSample> {
    Ok(PowerSample {
      sample_id:   decode_uuid(&self.sample_id)?,
      room_id:     decode_uuid(&self.room_id)?,
      watts:       self.watts,
      observed_at: decode_dt(&self.observed_at)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `energy_buckets` row.
pub struct RawBucket {
  pub room_id:      String,
  pub granularity:  String,
  pub period_start: String,
  pub total_kwh:    f64,
  pub avg_watts:    f64,
  pub max_watts:    f64,
  pub min_watts:    f64,
  pub sample_count: i64,
}

impl RawBucket {
  pub fn into_bucket(self) -> Result<EnergyBucket> {
    Ok(EnergyBucket {
      room_id:      decode_uuid(&self.room_id)?,
      granularity:  Granularity::parse(&self.granularity).map_err(Error::Core)?,
      period_start: decode_dt(&self.period_start)?,
      total_kwh:    self.total_kwh,
      avg_watts:    self.avg_watts,
      max_watts:    self.max_watts,
      min_watts:    self.min_watts,
      sample_count: self.sample_count,
    })
  }
}

/// Raw strings read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_id:  String,
  pub display_name: String,
  pub credential:   Option<String>,
}

impl RawIdentity {
  pub fn into_identity(self) -> Result<Identity> {
    Ok(Identity {
      identity_id:  decode_uuid(&self.identity_id)?,
      display_name: self.display_name,
      credential:   self.credential,
    })
  }
}

/// Raw strings read directly from a `rooms` row.
pub struct RawRoom {
  pub room_id:      String,
  pub name:         String,
  pub device_id:    String,
  pub device_token: String,
  pub active:       bool,
}

impl RawRoom {
  pub fn into_room(self) -> Result<Room> {
    Ok(Room {
      room_id:      decode_uuid(&self.room_id)?,
      name:         self.name,
      device_id:    self.device_id,
      device_token: self.device_token,
      active:       self.active,
    })
  }
}

/// Raw strings read directly from a `schedules` row.
pub struct RawSchedule {
  pub schedule_id: String,
  pub identity_id: String,
  pub room_id:     String,
  pub weekday:     u8,
  pub start_time:  String,
  pub end_time:    String,
}

impl RawSchedule {
  pub fn into_entry(self) -> Result<ScheduleEntry> {
    Ok(ScheduleEntry {
      schedule_id: decode_uuid(&self.schedule_id)?,
      identity_id: decode_uuid(&self.identity_id)?,
      room_id:     decode_uuid(&self.room_id)?,
      weekday:     self.weekday,
      start_time:  decode_time(&self.start_time)?,
      end_time:    decode_time(&self.end_time)?,
    })
  }
}

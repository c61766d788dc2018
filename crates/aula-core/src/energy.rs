//! Power samples, rollup buckets, and the pure integration math.
//!
//! Raw samples are append-only ground truth; buckets are derived and can
//! always be recomputed from the ledger.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── Samples ─────────────────────────────────────────────────────────────────

/// An instantaneous wattage reading from a room's device. Immutable once
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSample {
  pub sample_id:   Uuid,
  pub room_id:     Uuid,
  pub watts:       f64,
  pub observed_at: DateTime<Utc>,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::EnergyStore::append_sample`].
#[derive(Debug, Clone)]
pub struct NewPowerSample {
  pub room_id:     Uuid,
  pub watts:       f64,
  pub observed_at: DateTime<Utc>,
}

// ─── Buckets ─────────────────────────────────────────────────────────────────

/// Rollup period size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  Hour,
  Day,
  Month,
}

impl Granularity {
  pub const ALL: [Granularity; 3] = [Self::Hour, Self::Day, Self::Month];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Hour => "hour",
      Self::Day => "day",
      Self::Month => "month",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "hour" => Ok(Self::Hour),
      "day" => Ok(Self::Day),
      "month" => Ok(Self::Month),
      other => Err(crate::Error::UnknownGranularity(other.to_owned())),
    }
  }

  /// Start of the period of this granularity containing `at`.
  pub fn period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
    let d = at.date_naive();
    match self {
      Self::Hour => d.and_hms_opt(at.hour(), 0, 0).unwrap().and_utc(),
      Self::Day => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
      Self::Month => Utc
        .with_ymd_and_hms(d.year(), d.month(), 1, 0, 0, 0)
        .unwrap(),
    }
  }

  /// Exclusive end of the period starting at `period_start`.
  pub fn period_end(&self, period_start: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      Self::Hour => period_start + Duration::hours(1),
      Self::Day => period_start + Duration::days(1),
      Self::Month => {
        let (y, m) = (period_start.year(), period_start.month());
        let (ny, nm) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
        Utc.with_ymd_and_hms(ny, nm, 1, 0, 0, 0).unwrap()
      }
    }
  }
}

/// Pre-aggregated energy and wattage statistics for one room and period.
/// Updated incrementally as samples arrive; recomputable from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyBucket {
  pub room_id:      Uuid,
  pub granularity:  Granularity,
  pub period_start: DateTime<Utc>,
  pub total_kwh:    f64,
  pub avg_watts:    f64,
  pub max_watts:    f64,
  pub min_watts:    f64,
  pub sample_count: i64,
}

// ─── Integration ─────────────────────────────────────────────────────────────

/// Energy contributed by `next`, given its predecessor in the same room.
///
/// Trapezoidal rule: the average of the two readings, held over the
/// elapsed interval, converted from W·s to kWh. Returns zero when there
/// is no predecessor (the sample only establishes a baseline), when the
/// interval is non-positive (duplicate or reversed timestamps), or when
/// it exceeds `gap_ceiling` — a gap that long means the device was down,
/// and integrating across it would fabricate consumption.
pub fn integrate_kwh(
  prev: Option<&PowerSample>,
  next: &NewPowerSample,
  gap_ceiling: Duration,
) -> f64 {
  let Some(prev) = prev else { return 0.0 };
  let dt = next.observed_at - prev.observed_at;
  if dt <= Duration::zero() || dt > gap_ceiling {
    return 0.0;
  }
  let secs = dt.num_milliseconds() as f64 / 1_000.0;
  (prev.watts + next.watts) / 2.0 * secs / 3_600_000.0
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(watts: f64, at: &str) -> PowerSample {
    PowerSample {
      sample_id:   Uuid::new_v4(),
      room_id:     Uuid::nil(),
      watts,
      observed_at: at.parse().unwrap(),
      created_at:  at.parse().unwrap(),
    }
  }

  fn new_sample(watts: f64, at: &str) -> NewPowerSample {
    NewPowerSample {
      room_id:     Uuid::nil(),
      watts,
      observed_at: at.parse().unwrap(),
    }
  }

  fn ceiling() -> Duration {
    Duration::minutes(10)
  }

  #[test]
  fn first_sample_contributes_zero() {
    let next = new_sample(100.0, "2026-03-02T09:00:00Z");
    assert_eq!(integrate_kwh(None, &next, ceiling()), 0.0);
  }

  #[test]
  fn trapezoid_over_one_hour() {
    // 100 W then 200 W an hour later: (100+200)/2 * 1h = 150 Wh.
    let prev = sample(100.0, "2026-03-02T09:00:00Z");
    let next = new_sample(200.0, "2026-03-02T10:00:00Z");
    let kwh = integrate_kwh(Some(&prev), &next, Duration::hours(2));
    assert!((kwh - 0.15).abs() < 1e-9, "got {kwh}");
  }

  #[test]
  fn gap_beyond_ceiling_contributes_zero() {
    let prev = sample(100.0, "2026-03-02T09:00:00Z");
    let next = new_sample(200.0, "2026-03-02T09:20:00Z");
    assert_eq!(integrate_kwh(Some(&prev), &next, ceiling()), 0.0);
  }

  #[test]
  fn gap_exactly_at_ceiling_integrates() {
    let prev = sample(60.0, "2026-03-02T09:00:00Z");
    let next = new_sample(60.0, "2026-03-02T09:10:00Z");
    let kwh = integrate_kwh(Some(&prev), &next, ceiling());
    assert!((kwh - 0.01).abs() < 1e-9, "got {kwh}");
  }

  #[test]
  fn reversed_timestamps_contribute_zero() {
    let prev = sample(100.0, "2026-03-02T09:05:00Z");
    let next = new_sample(200.0, "2026-03-02T09:00:00Z");
    assert_eq!(integrate_kwh(Some(&prev), &next, ceiling()), 0.0);
  }

  #[test]
  fn period_start_truncates() {
    let at = "2026-03-02T09:42:17Z".parse().unwrap();
    assert_eq!(
      Granularity::Hour.period_start(at),
      "2026-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );
    assert_eq!(
      Granularity::Day.period_start(at),
      "2026-03-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );
    assert_eq!(
      Granularity::Month.period_start(at),
      "2026-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );
  }

  #[test]
  fn period_end_handles_year_rollover() {
    let dec = "2026-12-01T00:00:00Z".parse().unwrap();
    assert_eq!(
      Granularity::Month.period_end(dec),
      "2027-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
    );
  }
}

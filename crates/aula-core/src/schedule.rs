//! Schedule entries and the pure window-matching logic the validator
//! builds on.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One expected presence window: identity X is expected in room Y every
/// week on `weekday` between `start_time` and `end_time`.
///
/// Entries for the same identity must not overlap on a given weekday; a
/// misconfigured overlap is tolerated at scan time (latest start wins)
/// but logged by the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
  pub schedule_id: Uuid,
  pub identity_id: Uuid,
  pub room_id:     Uuid,
  /// 0 = Monday … 6 = Sunday, matching
  /// [`chrono::Weekday::num_days_from_monday`].
  pub weekday:     u8,
  pub start_time:  NaiveTime,
  pub end_time:    NaiveTime,
}

impl ScheduleEntry {
  /// Whether a scan at `observed_at` falls inside this entry's window.
  ///
  /// The window is `[start_time - grace, end_time)`: a scan slightly
  /// before the scheduled start still counts (teachers arrive early), a
  /// scan at or after the end does not.
  pub fn matches_at(&self, observed_at: DateTime<Utc>, grace: Duration) -> bool {
    if self.weekday != weekday_of(observed_at) {
      return false;
    }
    // Anchor the window on the scan's own date before subtracting the
    // grace: `NaiveTime` subtraction wraps at midnight, which would slam
    // the open bound to late evening for windows starting just after
    // 00:00.
    let date = observed_at.date_naive();
    let open = date.and_time(self.start_time).and_utc() - grace;
    let close = date.and_time(self.end_time).and_utc();
    observed_at >= open && observed_at < close
  }

  /// The expected session end for this entry on a concrete date.
  pub fn expected_end_on(&self, date: NaiveDate) -> DateTime<Utc> {
    date.and_time(self.end_time).and_utc()
  }
}

/// Weekday index of a timestamp, 0 = Monday.
pub fn weekday_of(at: DateTime<Utc>) -> u8 {
  at.weekday().num_days_from_monday() as u8
}

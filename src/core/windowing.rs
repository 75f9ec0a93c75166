//! Window arithmetic for tier records.
//!
//! Records are keyed by the end of the window they summarize. Window ends are
//! floored to a multiple of the window length (counted from the Unix epoch) so
//! that a tier produces at most one key per window, no matter when within the
//! window its tick actually fired.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start time of the window
    pub start: DateTime<Utc>,
    /// End time of the window (the record key)
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The window of `minutes` length that ends at the boundary at or before `now`.
    pub fn ending_at_or_before(now: DateTime<Utc>, minutes: u32) -> Self {
        let end = floor_to_window(now, minutes);
        Self {
            start: end - Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    /// The window of `minutes` length whose end is the boundary nearest `now`.
    ///
    /// Used for scheduled ticks, which fire on a boundary but may read a
    /// wall clock that is slightly behind or ahead of it.
    pub fn nearest(now: DateTime<Utc>, minutes: u32) -> Self {
        Self::ending_at(round_to_window(now, minutes), minutes)
    }

    /// Window of `minutes` length ending exactly at `end`.
    pub fn ending_at(end: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: end - Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    /// Whether a child record keyed at `timestamp` belongs to this window.
    ///
    /// Child keys are window ends, so the window owns `(start, end]`.
    pub fn owns_child_end(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.start && timestamp <= self.end
    }

    /// Offset of `timestamp` from the window start, in whole minutes.
    pub fn offset_minutes(&self, timestamp: DateTime<Utc>) -> i64 {
        (timestamp - self.start).num_minutes()
    }

    /// Window length in minutes.
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Floor `timestamp` to the nearest multiple of `minutes` at or before it.
pub fn floor_to_window(timestamp: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let window_secs = i64::from(minutes.max(1)) * 60;
    let secs = timestamp.timestamp();
    let floored = secs - secs.rem_euclid(window_secs);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(timestamp)
}

/// Round `timestamp` to the nearest multiple of `minutes`; halfway rounds up.
pub fn round_to_window(timestamp: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let half = i64::from(minutes.max(1)) * 30;
    floor_to_window(timestamp + Duration::seconds(half), minutes)
}

/// Time until the next window boundary strictly after `now`.
pub fn until_next_boundary(now: DateTime<Utc>, minutes: u32) -> std::time::Duration {
    let next = floor_to_window(now, minutes) + Duration::minutes(i64::from(minutes.max(1)));
    (next - now).to_std().unwrap_or_default()
}

/// Whole minutes between two timestamps, rounded to the nearest minute.
pub fn rounded_minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    let millis = (later - earlier).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    #[test]
    fn test_floor_to_window() {
        assert_eq!(floor_to_window(at(10, 3, 59), 2), at(10, 2, 0));
        assert_eq!(floor_to_window(at(10, 4, 0), 2), at(10, 4, 0));
        assert_eq!(floor_to_window(at(10, 59, 0), 10), at(10, 50, 0));
        assert_eq!(floor_to_window(at(10, 59, 0), 60), at(10, 0, 0));
    }

    #[test]
    fn test_tick_window_tolerates_clock_skew() {
        // A tick for the 10:02 boundary that reads the clock a second early
        assert_eq!(TimeWindow::nearest(at(10, 1, 59), 2).end, at(10, 2, 0));
        assert_eq!(TimeWindow::nearest(at(10, 2, 1), 2).end, at(10, 2, 0));
        assert_eq!(TimeWindow::nearest(at(10, 9, 58), 10).start, at(10, 0, 0));
        assert_eq!(round_to_window(at(10, 31, 0), 60), at(11, 0, 0));
        assert_eq!(round_to_window(at(10, 29, 59), 60), at(10, 0, 0));
    }

    #[test]
    fn test_window_ownership() {
        let window = TimeWindow::ending_at_or_before(at(10, 10, 30), 10);
        assert_eq!(window.start, at(10, 0, 0));
        assert_eq!(window.end, at(10, 10, 0));

        assert!(!window.owns_child_end(at(10, 0, 0)));
        assert!(window.owns_child_end(at(10, 2, 0)));
        assert!(window.owns_child_end(at(10, 10, 0)));
        assert!(!window.owns_child_end(at(10, 12, 0)));
        assert_eq!(window.offset_minutes(at(10, 4, 0)), 4);
    }

    #[test]
    fn test_until_next_boundary() {
        let wait = until_next_boundary(at(10, 3, 30), 2);
        assert_eq!(wait, std::time::Duration::from_secs(30));

        let wait = until_next_boundary(at(10, 4, 0), 2);
        assert_eq!(wait, std::time::Duration::from_secs(120));
    }

    #[test]
    fn test_rounded_minutes_between() {
        assert_eq!(rounded_minutes_between(at(10, 0, 0), at(10, 4, 29)), 4);
        assert_eq!(rounded_minutes_between(at(10, 0, 0), at(10, 4, 30)), 5);
    }
}

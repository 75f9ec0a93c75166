//! Service-interruption gap detection for the Base tier.

use crate::core::record::{GapInfo, SummaryRecord};
use crate::core::windowing::rounded_minutes_between;
use chrono::{DateTime, Utc};

/// Compare the newest record in `history` (ascending) against `now`.
///
/// Returns a gap only when more than two expected intervals have passed,
/// meaning the agent was not running continuously and any continuity the
/// analysis might infer from the previous record is not real.
pub fn detect_gap(
    history: &[SummaryRecord],
    now: DateTime<Utc>,
    expected_interval_minutes: u32,
) -> Option<GapInfo> {
    let last = history.last()?;
    let gap_minutes = rounded_minutes_between(last.timestamp, now);

    if gap_minutes > 2 * i64::from(expected_interval_minutes) {
        Some(GapInfo {
            gap_minutes,
            last_record_time: last.timestamp,
        })
    } else {
        None
    }
}

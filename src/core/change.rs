//! Change detection: the fast path that lets a tier skip analysis.
//!
//! The Base tier compares raw evidence payloads. Mid and Top tiers never look
//! at evidence; they skip when every child record already reports no change,
//! which is how an idle stretch propagates upward without any analysis call.

use crate::collector::types::Evidence;
use crate::core::record::{
    ActivityClaim, CategoryType, SummaryRecord, TierPayload, NO_ACTIVITY_LABEL,
};
use crate::core::tier::Tier;
use crate::core::windowing::TimeWindow;

/// What a no-change record was derived from.
#[derive(Debug, Clone, Copy)]
pub enum NoChangeBasis<'a> {
    /// Identical Base evidence
    Evidence(&'a [Evidence]),
    /// Child records that all report no change
    Children(&'a [SummaryRecord]),
}

/// Whether every evidence item is byte-identical to the first.
///
/// Fewer than two items is not enough to call it unchanged.
pub fn all_identical(evidence: &[Evidence]) -> bool {
    match evidence.split_first() {
        Some((first, rest)) if !rest.is_empty() => rest.iter().all(|e| e.same_payload(first)),
        _ => false,
    }
}

/// Whether every child record reports no change. False for an empty list.
pub fn all_no_change(children: &[SummaryRecord]) -> bool {
    !children.is_empty() && children.iter().all(|r| r.no_change)
}

/// Build a schema-complete placeholder record for a skipped window.
pub fn build_no_change_record(
    tier: Tier,
    window: &TimeWindow,
    basis: NoChangeBasis<'_>,
) -> SummaryRecord {
    let mut record = SummaryRecord::new(tier, window.end);
    record.no_change = true;

    let (count, reason) = match basis {
        NoChangeBasis::Evidence(items) => (
            items.len(),
            format!(
                "{} identical captures between {} and {}; analysis skipped",
                items.len(),
                window.start.format("%H:%M"),
                window.end.format("%H:%M")
            ),
        ),
        NoChangeBasis::Children(children) => {
            let child = tier.child().map(Tier::as_str).unwrap_or("child");
            (
                children.len(),
                format!(
                    "all {} {} records report no change; analysis skipped",
                    children.len(),
                    child
                ),
            )
        }
    };
    record.skip_reason = Some(reason);

    match &mut record.payload {
        TierPayload::Base(base) => {
            base.claims = vec![ActivityClaim::new(
                CategoryType::Behavior,
                NO_ACTIVITY_LABEL,
            )];
            base.duration_minutes = Some(window.minutes().max(0) as u32);
            base.evidence_count = count;
        }
        TierPayload::Mid(mid) => {
            mid.child_count = count;
            mid.no_change_child_count = Some(count);
        }
        TierPayload::Top(top) => {
            top.child_count = count;
            top.no_change_child_count = Some(count);
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn evidence(bytes: &[u8]) -> Evidence {
        Evidence::new("image/png", bytes.to_vec())
    }

    fn window(end_minute: u32, minutes: u32) -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 10, end_minute, 0).unwrap();
        TimeWindow::ending_at(end, minutes)
    }

    #[test]
    fn test_all_identical_needs_two_items() {
        assert!(!all_identical(&[]));
        assert!(!all_identical(&[evidence(b"a")]));
    }

    #[test]
    fn test_all_identical_compares_against_first() {
        let same = vec![evidence(b"frame"), evidence(b"frame"), evidence(b"frame")];
        assert!(all_identical(&same));

        let mut changed = same.clone();
        changed[2] = evidence(b"frame2");
        assert!(!all_identical(&changed));
    }

    #[test]
    fn test_all_no_change() {
        assert!(!all_no_change(&[]));

        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 10, 2, 0).unwrap();
        let mut idle = SummaryRecord::new(Tier::Base, ts);
        idle.no_change = true;
        let active = SummaryRecord::new(Tier::Base, ts + Duration::minutes(2));

        assert!(all_no_change(&[idle.clone(), idle.clone()]));
        assert!(!all_no_change(&[idle, active]));
    }

    #[test]
    fn test_base_placeholder_record() {
        let items = vec![evidence(b"x"), evidence(b"x")];
        let record =
            build_no_change_record(Tier::Base, &window(4, 2), NoChangeBasis::Evidence(&items));

        assert!(record.no_change);
        assert_eq!(record.tier(), Tier::Base);
        assert!(record.skip_reason.as_deref().unwrap().contains("2 identical"));
        assert_eq!(record.claims().len(), 1);
        assert_eq!(record.claims()[0].category_type, CategoryType::Behavior);
        assert_eq!(record.claims()[0].category_name, NO_ACTIVITY_LABEL);
        assert_eq!(record.duration_minutes(), Some(2));
    }

    #[test]
    fn test_mid_placeholder_record() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 10, 2, 0).unwrap();
        let children: Vec<SummaryRecord> = (0..5)
            .map(|i| {
                let mut r = SummaryRecord::new(Tier::Base, ts + Duration::minutes(2 * i));
                r.no_change = true;
                r
            })
            .collect();

        let record =
            build_no_change_record(Tier::Mid, &window(10, 10), NoChangeBasis::Children(&children));

        assert!(record.no_change);
        assert!(record.entries().is_empty());
        match record.payload {
            TierPayload::Mid(mid) => {
                assert_eq!(mid.no_change_child_count, Some(5));
                assert_eq!(mid.child_count, 5);
            }
            other => panic!("expected mid payload, got {other:?}"),
        }
    }
}

//! Timeline aggregation: folding child records into parent-tier timelines.
//!
//! Every child claim (Base to Mid) or timeline entry (Mid to Top) becomes a
//! [`Segment`] positioned on the parent window. Segments sharing an
//! [`ActivityKey`] are merged when they touch (within a tolerance), then
//! anything shorter than the significance threshold is filtered out. A single
//! two-minute Base appearance is treated as noise; an activity that persists
//! across windows earns a place in the parent timeline.

use crate::core::record::{ActivityKey, SummaryRecord, TimelineEntry, TierPayload, MAX_CLAIMS};
use crate::core::tier::Tier;
use crate::core::windowing::TimeWindow;
use std::collections::{BTreeSet, HashMap};

/// Output ordering for aggregated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrder {
    /// Ascending by start offset (Mid timeline)
    ByStart,
    /// Collapsed per activity, descending by total minutes (Top distribution)
    ByMinutesDesc,
}

/// Merge and filter settings for one parent tier.
///
/// The two tiers use separately configured tolerances rather than one
/// derived rule: Base windows are contiguous, Mid entries are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationRule {
    /// Largest gap (minutes) between segments of one activity that still merges
    pub merge_tolerance_minutes: i64,
    /// Segments shorter than this are excluded from the primary output
    pub filter_threshold_minutes: i64,
    /// Keep excluded segments in a miscellaneous bucket instead of dropping them
    pub collect_miscellaneous: bool,
    pub order: EntryOrder,
}

impl AggregationRule {
    /// Base records into a Mid timeline.
    pub fn base_to_mid() -> Self {
        Self {
            merge_tolerance_minutes: 0,
            filter_threshold_minutes: 3,
            collect_miscellaneous: false,
            order: EntryOrder::ByStart,
        }
    }

    /// Mid records into a Top distribution.
    pub fn mid_to_top() -> Self {
        Self {
            merge_tolerance_minutes: 4,
            filter_threshold_minutes: 5,
            collect_miscellaneous: true,
            order: EntryOrder::ByMinutesDesc,
        }
    }

    /// Rule for aggregating into `tier`, if that tier aggregates at all.
    pub fn for_parent(tier: Tier) -> Option<Self> {
        match tier {
            Tier::Base => None,
            Tier::Mid => Some(Self::base_to_mid()),
            Tier::Top => Some(Self::mid_to_top()),
        }
    }
}

/// A run of one activity on the parent window, in minute offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: ActivityKey,
    pub subtasks: BTreeSet<String>,
    pub start: i64,
    pub end: i64,
    pub minutes: i64,
}

impl Segment {
    /// Position an existing entry on a parent window, shifted by `base_offset`.
    pub fn from_entry(entry: &TimelineEntry, base_offset: i64) -> Self {
        Self {
            key: entry.key(),
            subtasks: entry.subtasks.clone(),
            start: base_offset + entry.start_offset,
            end: base_offset + entry.end_offset,
            minutes: entry.minutes,
        }
    }

    pub fn into_entry(self) -> TimelineEntry {
        TimelineEntry {
            label: self.key.label,
            category_type: self.key.category_type,
            start_offset: self.start,
            end_offset: self.end,
            minutes: self.minutes,
            subtasks: self.subtasks,
        }
    }

    fn absorb(&mut self, other: Segment) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        // Overlapping claims for one activity must not count the same minute twice.
        self.minutes = (self.minutes + other.minutes).min(self.end - self.start);
        self.subtasks.extend(other.subtasks);
    }
}

/// Result of aggregating one parent window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub entries: Vec<TimelineEntry>,
    pub miscellaneous: Vec<TimelineEntry>,
}

/// Turn child records into segments on the parent window.
///
/// Base children contribute one full-window segment per ranked claim. Mid
/// children contribute their own timeline entries, shifted onto the parent.
pub fn expand(children: &[SummaryRecord], parent: &TimeWindow, child_minutes: u32) -> Vec<Segment> {
    let mut segments = Vec::new();

    for child in children {
        let child_end = parent.offset_minutes(child.timestamp);
        let child_start = child_end - i64::from(child_minutes);

        match &child.payload {
            TierPayload::Base(base) => {
                for claim in base.claims.iter().take(MAX_CLAIMS) {
                    if claim.category_name.trim().is_empty() {
                        continue;
                    }
                    segments.push(Segment {
                        key: claim.key(),
                        subtasks: claim.subtask_name.iter().cloned().collect(),
                        start: child_start,
                        end: child_end,
                        minutes: i64::from(child_minutes),
                    });
                }
            }
            TierPayload::Mid(mid) => {
                segments.extend(
                    mid.timeline
                        .iter()
                        .map(|entry| Segment::from_entry(entry, child_start)),
                );
            }
            TierPayload::Top(_) => {}
        }
    }

    segments
}

/// Merge segments of the same activity that start within `tolerance` minutes
/// of that activity's open segment.
///
/// A segment starting further away closes the open one and starts a new run.
/// Merging already-merged output returns it unchanged.
pub fn merge_segments(mut segments: Vec<Segment>, tolerance: i64) -> Vec<Segment> {
    segments.sort_by(canonical_order);

    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut open: HashMap<ActivityKey, usize> = HashMap::new();

    for segment in segments {
        match open.get(&segment.key) {
            Some(&idx) if segment.start <= merged[idx].end + tolerance => {
                merged[idx].absorb(segment);
            }
            _ => {
                open.insert(segment.key.clone(), merged.len());
                merged.push(segment);
            }
        }
    }

    merged.sort_by(canonical_order);
    merged
}

fn canonical_order(a: &Segment, b: &Segment) -> std::cmp::Ordering {
    a.start
        .cmp(&b.start)
        .then(a.end.cmp(&b.end))
        .then_with(|| a.key.cmp(&b.key))
}

/// Split segments into those meeting `threshold` minutes and those below it.
pub fn filter_segments(segments: Vec<Segment>, threshold: i64) -> (Vec<Segment>, Vec<Segment>) {
    segments.into_iter().partition(|s| s.minutes >= threshold)
}

/// Collapse segments into one total per activity.
fn collapse_by_key(segments: Vec<Segment>) -> Vec<Segment> {
    let mut totals: Vec<Segment> = Vec::new();
    let mut index: HashMap<ActivityKey, usize> = HashMap::new();

    for segment in segments {
        match index.get(&segment.key) {
            Some(&idx) => {
                let total = &mut totals[idx];
                total.start = total.start.min(segment.start);
                total.end = total.end.max(segment.end);
                total.minutes += segment.minutes;
                total.subtasks.extend(segment.subtasks);
            }
            None => {
                index.insert(segment.key.clone(), totals.len());
                totals.push(segment);
            }
        }
    }

    totals
}

fn order_segments(mut segments: Vec<Segment>, order: EntryOrder) -> Vec<TimelineEntry> {
    match order {
        EntryOrder::ByStart => {
            segments.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.key.cmp(&b.key)));
        }
        EntryOrder::ByMinutesDesc => {
            segments = collapse_by_key(segments);
            segments.sort_by(|a, b| b.minutes.cmp(&a.minutes).then_with(|| a.key.cmp(&b.key)));
        }
    }
    segments.into_iter().map(Segment::into_entry).collect()
}

/// Aggregate child records into the parent window's entries.
pub fn aggregate(
    children: &[SummaryRecord],
    parent: &TimeWindow,
    child_minutes: u32,
    rule: &AggregationRule,
) -> Aggregation {
    let merged = merge_segments(
        expand(children, parent, child_minutes),
        rule.merge_tolerance_minutes,
    );
    let (kept, excluded) = filter_segments(merged, rule.filter_threshold_minutes);

    Aggregation {
        entries: order_segments(kept, rule.order),
        miscellaneous: if rule.collect_miscellaneous {
            order_segments(excluded, rule.order)
        } else {
            Vec::new()
        },
    }
}

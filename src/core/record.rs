//! Summary records produced by each tier.
//!
//! A record is immutable once persisted and is identified by its tier and the
//! end of the window it summarizes. Tier-specific content lives in
//! [`TierPayload`], so a Base record can never carry a Top distribution and
//! vice versa.

use crate::core::tier::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label used for the placeholder claim of a no-change Base record.
pub const NO_ACTIVITY_LABEL: &str = "No screen activity";

/// Maximum number of ranked claims a Base record carries.
pub const MAX_CLAIMS: usize = 3;

/// How a claim relates to the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    /// An existing task
    Task,
    /// An existing behavior
    Behavior,
    /// A task the analysis proposes adding to the taxonomy
    #[serde(alias = "newTask", alias = "new-task")]
    NewTask,
    /// A behavior the analysis proposes adding to the taxonomy
    #[serde(alias = "newBehavior", alias = "new-behavior")]
    NewBehavior,
    /// Anything the analysis returned that we do not recognize
    #[serde(other)]
    Other,
}

impl CategoryType {
    /// Whether this claim proposes a new taxonomy entry.
    pub fn is_proposed(self) -> bool {
        matches!(self, CategoryType::NewTask | CategoryType::NewBehavior)
    }

    /// Collapse proposed types onto the entry kind they will become.
    ///
    /// A task proposed in one window is an ordinary task in the next, so
    /// timeline grouping uses the settled kind.
    pub fn settled(self) -> CategoryType {
        match self {
            CategoryType::NewTask => CategoryType::Task,
            CategoryType::NewBehavior => CategoryType::Behavior,
            other => other,
        }
    }
}

/// One ranked activity claim within a Base record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityClaim {
    #[serde(alias = "categoryType")]
    pub category_type: CategoryType,
    #[serde(alias = "categoryName")]
    pub category_name: String,
    #[serde(default, alias = "subtaskName", skip_serializing_if = "Option::is_none")]
    pub subtask_name: Option<String>,
}

impl ActivityClaim {
    pub fn new(category_type: CategoryType, category_name: impl Into<String>) -> Self {
        Self {
            category_type,
            category_name: category_name.into(),
            subtask_name: None,
        }
    }

    pub fn with_subtask(mut self, subtask: impl Into<String>) -> Self {
        self.subtask_name = Some(subtask.into());
        self
    }

    /// Grouping key for timeline aggregation.
    pub fn key(&self) -> ActivityKey {
        ActivityKey::new(self.category_type, &self.category_name)
    }
}

/// Composite grouping key: settled category type plus label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityKey {
    pub category_type: CategoryType,
    pub label: String,
}

impl ActivityKey {
    pub fn new(category_type: CategoryType, label: &str) -> Self {
        Self {
            category_type: category_type.settled(),
            label: label.trim().to_string(),
        }
    }
}

/// A merged run of one activity inside a Mid or Top window.
///
/// Offsets are minutes from the start of the record's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub label: String,
    pub category_type: CategoryType,
    pub start_offset: i64,
    pub end_offset: i64,
    pub minutes: i64,
    #[serde(default)]
    pub subtasks: BTreeSet<String>,
}

impl TimelineEntry {
    pub fn key(&self) -> ActivityKey {
        ActivityKey::new(self.category_type, &self.label)
    }
}

/// Token accounting reported by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// A detected interruption between the last Base record and now.
///
/// Attached to the analysis request only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapInfo {
    pub gap_minutes: i64,
    pub last_record_time: DateTime<Utc>,
}

/// Base tier content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseSummary {
    /// 1-3 ranked claims, primary first
    #[serde(default)]
    pub claims: Vec<ActivityClaim>,
    /// How long the primary activity has continued, in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Number of evidence items the window was built from
    #[serde(default)]
    pub evidence_count: usize,
}

/// Mid tier content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidSummary {
    /// Merged activity segments, ascending by start
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub child_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_change_child_count: Option<usize>,
}

/// Top tier content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopSummary {
    /// Per-activity totals, descending by minutes
    #[serde(default)]
    pub distribution: Vec<TimelineEntry>,
    /// Activities below the significance threshold
    #[serde(default)]
    pub miscellaneous: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub child_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_change_child_count: Option<usize>,
}

/// Tier-specific record content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum TierPayload {
    Base(BaseSummary),
    Mid(MidSummary),
    Top(TopSummary),
}

impl TierPayload {
    /// Empty content for a tier.
    pub fn empty(tier: Tier) -> Self {
        match tier {
            Tier::Base => TierPayload::Base(BaseSummary::default()),
            Tier::Mid => TierPayload::Mid(MidSummary::default()),
            Tier::Top => TierPayload::Top(TopSummary::default()),
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            TierPayload::Base(_) => Tier::Base,
            TierPayload::Mid(_) => Tier::Mid,
            TierPayload::Top(_) => Tier::Top,
        }
    }
}

/// One persisted summary for one tier window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// End of the summarized window
    pub timestamp: DateTime<Utc>,
    /// True when the window was skipped because nothing changed
    #[serde(default)]
    pub no_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Unparsed analysis output, kept when decoding failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
    #[serde(flatten)]
    pub payload: TierPayload,
}

impl SummaryRecord {
    /// A record with empty content for the given tier and window end.
    pub fn new(tier: Tier, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            no_change: false,
            skip_reason: None,
            raw_response: None,
            usage: None,
            payload: TierPayload::empty(tier),
        }
    }

    pub fn tier(&self) -> Tier {
        self.payload.tier()
    }

    /// Ranked claims (Base records only; empty otherwise).
    pub fn claims(&self) -> &[ActivityClaim] {
        match &self.payload {
            TierPayload::Base(base) => &base.claims,
            _ => &[],
        }
    }

    pub fn primary_claim(&self) -> Option<&ActivityClaim> {
        self.claims().first()
    }

    /// Timeline entries (Mid) or distribution entries (Top).
    pub fn entries(&self) -> &[TimelineEntry] {
        match &self.payload {
            TierPayload::Base(_) => &[],
            TierPayload::Mid(mid) => &mid.timeline,
            TierPayload::Top(top) => &top.distribution,
        }
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        match &self.payload {
            TierPayload::Base(base) => base.duration_minutes,
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match &self.payload {
            TierPayload::Base(base) => base.summary.as_deref(),
            TierPayload::Mid(mid) => mid.summary.as_deref(),
            TierPayload::Top(top) => top.summary.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_json_is_tagged_by_tier() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 10, 2, 0).unwrap();
        let mut record = SummaryRecord::new(Tier::Base, ts);
        if let TierPayload::Base(base) = &mut record.payload {
            base.claims
                .push(ActivityClaim::new(CategoryType::Task, "Write report").with_subtask("Intro"));
        }

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tier"], "base");
        assert_eq!(json["claims"][0]["category_type"], "task");
        assert_eq!(json["claims"][0]["subtask_name"], "Intro");
        assert!(json.get("timeline").is_none());

        let back: SummaryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.tier(), Tier::Base);
    }

    #[test]
    fn test_claim_accepts_camel_case_and_unknown_types() {
        let claim: ActivityClaim = serde_json::from_str(
            r#"{"categoryType": "newBehavior", "categoryName": "Doomscrolling"}"#,
        )
        .unwrap();
        assert_eq!(claim.category_type, CategoryType::NewBehavior);
        assert!(claim.category_type.is_proposed());

        let claim: ActivityClaim =
            serde_json::from_str(r#"{"category_type": "mood", "category_name": "Calm"}"#).unwrap();
        assert_eq!(claim.category_type, CategoryType::Other);
    }

    #[test]
    fn test_key_settles_proposed_types() {
        let proposed = ActivityClaim::new(CategoryType::NewTask, " Taxes ");
        let settled = ActivityClaim::new(CategoryType::Task, "Taxes");
        assert_eq!(proposed.key(), settled.key());
        assert_ne!(
            settled.key(),
            ActivityClaim::new(CategoryType::Behavior, "Taxes").key()
        );
    }
}

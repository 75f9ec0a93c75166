//! Core functionality for the tier digest engine.
//!
//! This module contains the pure, synchronous pieces of the pipeline:
//! - Tier definitions and window arithmetic
//! - The summary record model
//! - Change detection, gap detection and timeline aggregation
//! - Decoding of analysis responses

pub mod change;
pub mod gap;
pub mod record;
pub mod response;
pub mod tier;
pub mod timeline;
pub mod windowing;

// Re-export commonly used types
pub use change::{all_identical, all_no_change, build_no_change_record, NoChangeBasis};
pub use gap::detect_gap;
pub use record::{
    ActivityClaim, ActivityKey, BaseSummary, CategoryType, GapInfo, MidSummary, SummaryRecord,
    TierPayload, TimelineEntry, TopSummary, UsageMetadata, MAX_CLAIMS, NO_ACTIVITY_LABEL,
};
pub use response::{parse_response, strip_code_fence, ParsedResponse};
pub use tier::{Tier, TierWindows};
pub use timeline::{aggregate, AggregationRule, Aggregation, EntryOrder, Segment};
pub use windowing::{floor_to_window, TimeWindow};

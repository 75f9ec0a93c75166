//! Persistence for summary records and the classification taxonomy.
//!
//! Records are append-only and keyed by `(tier, window end)`, so each tier
//! writes its own keys and cross-tier writes never collide. Reads return
//! records in ascending timestamp order.

pub mod file;
pub mod memory;
pub mod taxonomy;

use crate::core::record::SummaryRecord;
use crate::core::tier::Tier;
use async_trait::async_trait;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use taxonomy::{
    BehaviorEntry, EntryKind, EntryOrigin, FileTaxonomyStore, TaskEntry, Taxonomy, TaxonomyStore,
};

/// Storage errors.
#[derive(Debug)]
pub enum StoreError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {e}"),
            StoreError::ParseError(e) => write!(f, "Parse error: {e}"),
            StoreError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Store of summary records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record under its tier and timestamp, replacing any record
    /// already stored for that key.
    async fn save(&self, record: &SummaryRecord) -> Result<(), StoreError>;

    /// Up to `count` records that precede the newest `skip` records of `tier`,
    /// ascending by timestamp.
    async fn get_earlier(
        &self,
        tier: Tier,
        count: usize,
        skip: usize,
    ) -> Result<Vec<SummaryRecord>, StoreError>;

    /// The newest `count` records of `tier`, ascending by timestamp.
    async fn get_recent(&self, tier: Tier, count: usize) -> Result<Vec<SummaryRecord>, StoreError> {
        self.get_earlier(tier, count, 0).await
    }
}

/// Slice bounds for "`count` items before the last `skip`" over `len` items.
pub(crate) fn earlier_range(len: usize, count: usize, skip: usize) -> std::ops::Range<usize> {
    let end = len.saturating_sub(skip);
    let start = end.saturating_sub(count);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earlier_range() {
        assert_eq!(earlier_range(10, 3, 0), 7..10);
        assert_eq!(earlier_range(10, 3, 2), 5..8);
        assert_eq!(earlier_range(2, 5, 0), 0..2);
        assert_eq!(earlier_range(2, 5, 4), 0..0);
    }
}

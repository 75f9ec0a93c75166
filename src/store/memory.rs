//! In-memory record store for embedding hosts and tests.

use crate::core::record::SummaryRecord;
use crate::core::tier::Tier;
use crate::store::{earlier_range, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Keeps records in a map keyed by `(tier, timestamp)`.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<(Tier, DateTime<Utc>), SummaryRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of a tier, ascending.
    pub async fn all(&self, tier: Tier) -> Vec<SummaryRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|((t, _), _)| *t == tier)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Number of records stored for a tier.
    pub async fn count(&self, tier: Tier) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(t, _)| *t == tier)
            .count()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert((record.tier(), record.timestamp), record.clone());
        Ok(())
    }

    async fn get_earlier(
        &self,
        tier: Tier,
        count: usize,
        skip: usize,
    ) -> Result<Vec<SummaryRecord>, StoreError> {
        let all = self.all(tier).await;
        let range = earlier_range(all.len(), count, skip);
        Ok(all[range].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_memory_store_orders_by_timestamp() {
        let store = MemoryRecordStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        // Insert out of order
        for minutes in [4, 0, 2] {
            store
                .save(&SummaryRecord::new(Tier::Base, t0 + Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        store.save(&SummaryRecord::new(Tier::Mid, t0)).await.unwrap();

        let recent = store.get_recent(Tier::Base, 2).await.unwrap();
        assert_eq!(recent[0].timestamp, t0 + Duration::minutes(2));
        assert_eq!(recent[1].timestamp, t0 + Duration::minutes(4));
        assert_eq!(store.count(Tier::Base).await, 3);
        assert_eq!(store.count(Tier::Mid).await, 1);
    }
}

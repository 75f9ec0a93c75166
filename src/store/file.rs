//! File-backed record store: one JSON file per tier window.
//!
//! Layout: `<root>/<tier>/<YYYYMMDD-HHMM>.json`. File names sort in time
//! order, so listing a tier directory is enough to find recent records.

use crate::core::record::SummaryRecord;
use crate::core::tier::Tier;
use crate::store::{earlier_range, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const RECORD_EXTENSION: &str = "json";

/// Stores records as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.as_str())
    }

    /// Path of the record for `(tier, timestamp)`.
    pub fn record_path(&self, tier: Tier, timestamp: DateTime<Utc>) -> PathBuf {
        self.tier_dir(tier).join(format!(
            "{}.{RECORD_EXTENSION}",
            timestamp.format("%Y%m%d-%H%M")
        ))
    }

    async fn list_record_files(&self, tier: Tier) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.tier_dir(tier);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::IoError(format!("{dir:?}: {e}"))),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map(|e| e == RECORD_EXTENSION).unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_record(path: &Path) -> Result<SummaryRecord, StoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn save(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.tier(), record.timestamp);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;

        // Write then rename so readers never observe a half-written record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        tracing::debug!(tier = %record.tier(), path = ?path, "Saved summary record");
        Ok(())
    }

    async fn get_earlier(
        &self,
        tier: Tier,
        count: usize,
        skip: usize,
    ) -> Result<Vec<SummaryRecord>, StoreError> {
        let files = self.list_record_files(tier).await?;
        let range = earlier_range(files.len(), count, skip);

        let mut records = Vec::with_capacity(range.len());
        for path in &files[range] {
            match Self::read_record(path).await {
                Ok(record) if record.tier() == tier => records.push(record),
                Ok(record) => {
                    tracing::warn!(path = ?path, found = %record.tier(), "Skipping record filed under the wrong tier");
                }
                Err(e) => {
                    tracing::warn!(path = ?path, "Skipping unreadable record: {}", e);
                }
            }
        }
        Ok(records)
    }
}

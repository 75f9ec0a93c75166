//! Scheduler status snapshot, returned by `TierScheduler::status` and
//! persisted as `status.json` after every run.

use crate::core::tier::Tier;
use crate::transparency::log::TierStatsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Status of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub enabled: bool,
    pub window_minutes: u32,
    pub is_executing: bool,
    pub stats: TierStatsSnapshot,
}

/// Status of the whole scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub version: String,
    pub running: bool,
    pub session_start: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tiers: Vec<TierStatus>,
}

impl SchedulerStatus {
    pub fn tier(&self, tier: Tier) -> Option<&TierStatus> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    /// Save the snapshot as pretty JSON.
    ///
    /// Written to a uniquely named temp file and renamed into place, so a
    /// reader sees either the previous snapshot or this one.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = std::fs::write(&tmp, json).and_then(|_| std::fs::rename(&tmp, path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    /// Load a snapshot written by a (possibly different) process.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Scheduler {} (since {}, updated {})\n",
            if self.running { "running" } else { "stopped" },
            self.session_start.format("%Y-%m-%d %H:%M:%S UTC"),
            self.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        for t in &self.tiers {
            let state = match (t.enabled, t.is_executing) {
                (false, _) => "disabled",
                (true, true) => "executing",
                (true, false) => "idle",
            };
            out.push_str(&format!(
                "  {:<4} every {:>3}m  {:<9}  saved {}  skipped {}  errors {}  dropped {}",
                t.tier.as_str(),
                t.window_minutes,
                state,
                t.stats.count,
                t.stats.skipped,
                t.stats.errors,
                t.stats.dropped,
            ));
            if let Some(last) = &t.stats.last_run {
                out.push_str(&format!(
                    "  last {:?} at {}",
                    last.outcome,
                    last.at.format("%H:%M:%S")
                ));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchedulerStatus {
        let now = Utc::now();
        SchedulerStatus {
            version: "0.1.0".to_string(),
            running: true,
            session_start: now,
            updated_at: now,
            tiers: Tier::ALL
                .iter()
                .map(|&tier| TierStatus {
                    tier,
                    enabled: tier != Tier::Top,
                    window_minutes: 2,
                    is_executing: false,
                    stats: TierStatsSnapshot::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");
        let status = sample();

        status.save(&path).unwrap();
        assert_eq!(SchedulerStatus::load(&path).unwrap(), status);
    }

    #[test]
    fn test_concurrent_saves_never_expose_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        sample().save(&path).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        sample().save(&path).unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..200 {
            let status = SchedulerStatus::load(&path).expect("snapshot should always parse");
            assert_eq!(status.tiers.len(), 3);
        }
        for writer in writers {
            writer.join().unwrap();
        }

        // Only the snapshot itself remains
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_summary_lists_tiers() {
        let summary = sample().summary();
        assert!(summary.contains("Scheduler running"));
        assert!(summary.contains("base"));
        assert!(summary.contains("disabled"));
    }
}

//! Per-tier execution counters.
//!
//! Counters live for the process lifetime and reset only on restart.

use crate::core::tier::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// How a single tier run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Analysis ran and a record was saved
    Saved,
    /// Nothing changed; a no-change record was saved without analysis
    Skipped,
    /// No input was available; nothing written
    Empty,
    /// The allowed-time gate refused the run
    NotAllowed,
    /// Analysis or persistence failed; nothing written for the window
    Failed,
}

/// Outcome and time of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub at: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
}

/// Counters for one tier.
#[derive(Debug, Default)]
pub struct TierStats {
    /// Records saved after a successful analysis
    count: AtomicU64,
    /// Runs that failed in analysis or persistence
    errors: AtomicU64,
    /// No-change records saved without analysis
    skipped: AtomicU64,
    /// Ticks dropped because the tier was still executing
    dropped: AtomicU64,
    last_run: Mutex<Option<LastRun>>,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a finished run.
    pub fn record(&self, outcome: RunOutcome, window_end: Option<DateTime<Utc>>, at: DateTime<Utc>) {
        match outcome {
            RunOutcome::Saved => {
                self.count.fetch_add(1, Ordering::Relaxed);
            }
            RunOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            RunOutcome::Failed => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            RunOutcome::Empty | RunOutcome::NotAllowed => {}
        }
        if let Ok(mut last) = self.last_run.lock() {
            *last = Some(LastRun {
                at,
                window_end,
                outcome,
            });
        }
    }

    /// Record a tick dropped because a run was still in flight.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierStatsSnapshot {
        TierStatsSnapshot {
            count: self.count.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_run: self.last_run.lock().ok().and_then(|l| *l),
        }
    }
}

/// Point-in-time copy of [`TierStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStatsSnapshot {
    pub count: u64,
    pub errors: u64,
    pub skipped: u64,
    pub dropped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRun>,
}

/// Counters for all tiers plus the session start time.
#[derive(Debug)]
pub struct ExecutionLog {
    tiers: [TierStats; 3],
    session_start: DateTime<Utc>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self {
            tiers: Default::default(),
            session_start: Utc::now(),
        }
    }

    pub fn tier(&self, tier: Tier) -> &TierStats {
        &self.tiers[tier.index()]
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut out = String::from("Tier Statistics:\n");
        for tier in Tier::ALL {
            let s = self.tier(tier).snapshot();
            out.push_str(&format!(
                "- {tier}: {} saved, {} skipped (no change), {} errors, {} dropped ticks\n",
                s.count, s.skipped, s.errors, s.dropped
            ));
        }
        out.push_str(&format!(
            "Session duration: {} seconds",
            (Utc::now() - self.session_start).num_seconds()
        ));
        out
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

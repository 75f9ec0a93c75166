//! Execution transparency for the tier scheduler.
//!
//! Tracks what each tier did (records written, windows skipped, failures,
//! dropped ticks) and exposes it as a status snapshot that hosts can read
//! in-process or from `status.json` on disk.

pub mod log;
pub mod status;

// Re-export commonly used types
pub use log::{ExecutionLog, LastRun, RunOutcome, TierStats, TierStatsSnapshot};
pub use status::{SchedulerStatus, TierStatus};

//! Synheart Tier Digest - tiered activity summaries from captured evidence.
//!
//! This library rolls periodically captured evidence (screenshots written by
//! an external capture process) up through three time tiers into structured
//! summaries. Each tier ticks on its own, never overlaps with itself, and
//! skips the external analysis call whenever nothing changed.
//!
//! # Tiers
//!
//! - **Base** (2 min): classifies fresh evidence into 1-3 ranked activity claims
//! - **Mid** (10 min): merges Base claims into a timeline of activity segments
//! - **Top** (60 min): merges Mid timelines into a per-activity distribution
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        TierScheduler                             │
//! │      base loop (2m)      mid loop (10m)       top loop (60m)     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐    ┌────────────┐    ┌─────────────┐             │
//! │  │  Evidence  │───▶│   Change   │───▶│  Gap +      │             │
//! │  │  / Records │    │  Detector  │    │  Registry   │             │
//! │  └────────────┘    └────────────┘    └─────────────┘             │
//! │        ▲                 │ no change        │                    │
//! │        │                 ▼                  ▼                    │
//! │  ┌────────────┐    ┌────────────┐    ┌─────────────┐             │
//! │  │   Record   │◀───│  Timeline  │◀───│  Analysis + │             │
//! │  │   Store    │    │ Aggregator │    │  Parser     │             │
//! │  └────────────┘    └────────────┘    └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_tier_digest::{
//!     analysis::{AnalysisConfig, HttpAnalysisClient},
//!     collector::DirectoryEvidenceSource,
//!     scheduler::{SchedulerOptions, TierScheduler},
//!     store::FileRecordStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = TierScheduler::builder(
//!     SchedulerOptions::default(),
//!     Arc::new(DirectoryEvidenceSource::new("captures", &["png".to_string()])),
//!     Arc::new(FileRecordStore::new("records")),
//!     Arc::new(HttpAnalysisClient::new(&AnalysisConfig::default())?),
//! )
//! .build();
//!
//! scheduler.start();
//! // ... later
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod collector;
pub mod config;
pub mod core;
pub mod gate;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use analysis::{AnalysisClient, AnalysisError, HttpAnalysisClient};
pub use collector::{CollectorError, DirectoryEvidenceSource, Evidence, EvidenceSource};
pub use config::{Config, ConfigError};
pub use core::{SummaryRecord, Tier, TierWindows, TimelineEntry};
pub use registry::ClassificationRegistry;
pub use scheduler::{PipelineError, SchedulerOptions, TierScheduler};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore, StoreError};
pub use transparency::{ExecutionLog, RunOutcome, SchedulerStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

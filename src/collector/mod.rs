//! Evidence collection for the Base tier.
//!
//! Capturing evidence (screenshots, resizing) happens outside this crate. The
//! scheduler only needs the most recent items for a window, in ascending
//! capture order, through the [`EvidenceSource`] trait.

pub mod directory;
pub mod types;

use async_trait::async_trait;

pub use directory::DirectoryEvidenceSource;
pub use types::Evidence;

/// Errors that can occur while reading evidence.
#[derive(Debug)]
pub enum CollectorError {
    /// The evidence location could not be read
    Io(String),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::Io(e) => write!(f, "Evidence read error: {e}"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// Source of recent evidence.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Up to `max_count` items captured in the last `window_minutes`,
    /// ascending by capture time. May return fewer than requested.
    async fn recent_evidence(
        &self,
        window_minutes: u32,
        max_count: usize,
    ) -> Result<Vec<Evidence>, CollectorError>;
}

/// Advisory focus/context timeline folded into analysis requests.
#[async_trait]
pub trait ContextTimeline: Send + Sync {
    /// Human-readable description of what was in focus between `start` and
    /// `end`, if anything is known.
    async fn context_in_range(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Option<String>;
}

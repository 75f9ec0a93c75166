//! Retry with exponential backoff for transient analysis failures.

use crate::analysis::{AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behavior for analysis calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Cap on the delay between retries
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Call `client`, retrying transient failures with increasing backoff.
///
/// Non-transient errors are returned immediately. When attempts run out the
/// last error is returned.
pub async fn analyze_with_retry(
    client: &dyn AnalysisClient,
    request: &AnalysisRequest,
    config: &RetryConfig,
) -> Result<AnalysisResponse, AnalysisError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match client.analyze(request).await {
            Ok(response) => {
                if attempt > 1 {
                    tracing::info!(tier = %request.tier, attempt, "Analysis succeeded after retry");
                }
                return Ok(response);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    tier = %request.tier,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient analysis failure, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(tier = %request.tier, attempt, "Analysis failed: {}", e);
                return Err(e);
            }
        }
    }
}

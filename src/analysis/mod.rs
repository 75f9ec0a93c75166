//! The external analysis call.
//!
//! The analysis service is a black box: it receives a structured request
//! (evidence or child records plus context) and answers with text that is
//! expected, but not guaranteed, to be JSON. This is the only place the tier
//! pipeline suspends on something other than file I/O.

pub mod http;
pub mod retry;

use crate::collector::types::Evidence;
use crate::core::record::{ActivityClaim, GapInfo, SummaryRecord, TimelineEntry, UsageMetadata};
use crate::core::tier::Tier;
use crate::core::windowing::TimeWindow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http::{AnalysisConfig, HttpAnalysisClient};
pub use retry::{analyze_with_retry, RetryConfig};

/// Shape the service is asked to answer with, per tier.
pub fn expected_response(tier: Tier) -> &'static str {
    match tier {
        Tier::Base => {
            r#"{"claims":[{"category_type":"task|behavior|new_task|new_behavior","category_name":"...","subtask_name":"..."}],"summary":"..."} with 1-3 claims, primary first"#
        }
        Tier::Mid | Tier::Top => r#"{"summary":"..."}"#,
    }
}

/// Context attached to a request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    /// Set when the agent was not running continuously before this window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<GapInfo>,
    /// Rendered taxonomy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<String>,
    /// Advisory focus-window timeline text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// The previous record of the same tier (omitted after a gap)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<SummaryRecord>,
    /// Pre-aggregated timeline for Mid/Top requests
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEntry>,
}

/// One analysis request.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    pub tier: Tier,
    pub window: TimeWindow,
    /// Base tier input
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    /// Mid/Top tier input
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SummaryRecord>,
    pub context: RequestContext,
    pub expected_response: &'static str,
}

impl AnalysisRequest {
    /// A Base request over captured evidence.
    pub fn for_evidence(window: TimeWindow, evidence: Vec<Evidence>, context: RequestContext) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tier: Tier::Base,
            window,
            evidence,
            children: Vec::new(),
            context,
            expected_response: expected_response(Tier::Base),
        }
    }

    /// A Mid/Top request over child records.
    pub fn for_children(
        tier: Tier,
        window: TimeWindow,
        children: Vec<SummaryRecord>,
        context: RequestContext,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tier,
            window,
            evidence: Vec::new(),
            children,
            context,
            expected_response: expected_response(tier),
        }
    }
}

/// Raw answer from the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub text: String,
    #[serde(default, alias = "usageMetadata", skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl AnalysisResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Structured Base tier answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BaseAnalysis {
    /// Ranked claims, primary first
    pub claims: Vec<ActivityClaim>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Structured Mid/Top tier answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummaryAnalysis {
    pub summary: String,
}

/// Analysis call errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The call did not complete in time
    Timeout,
    /// The service asked us to slow down
    RateLimited,
    /// Connection-level failure
    Network(String),
    /// Service returned an error response
    Server { status: u16, message: String },
    /// Client misconfiguration
    Config(String),
    /// Response body could not be read
    Serialization(String),
}

impl AnalysisError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Timeout | AnalysisError::RateLimited | AnalysisError::Network(_) => true,
            AnalysisError::Server { status, .. } => *status >= 500,
            AnalysisError::Config(_) | AnalysisError::Serialization(_) => false,
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Timeout => write!(f, "Analysis call timed out"),
            AnalysisError::RateLimited => write!(f, "Analysis service rate limit reached"),
            AnalysisError::Network(msg) => write!(f, "Analysis network error: {msg}"),
            AnalysisError::Server { status, message } => {
                write!(f, "Analysis server error ({status}): {message}")
            }
            AnalysisError::Config(msg) => write!(f, "Analysis config error: {msg}"),
            AnalysisError::Serialization(msg) => write!(f, "Analysis serialization error: {msg}"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// The external analysis service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

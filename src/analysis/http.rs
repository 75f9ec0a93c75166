//! HTTP client for the analysis service.

use crate::analysis::{
    AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse, RetryConfig,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Analysis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Full URL of the analyze endpoint
    pub endpoint: String,
    /// Bearer authentication token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// File to read the token from when `token` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787/v1/analyze".to_string(),
            token: None,
            token_file: None,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// The bearer token, from config or from `token_file`.
    pub fn resolve_token(&self) -> Result<Option<String>, AnalysisError> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let token = std::fs::read_to_string(path)
            .map_err(|e| {
                AnalysisError::Config(format!("Failed to read analysis token from {path:?}: {e}"))
            })?
            .trim()
            .to_string();
        Ok((!token.is_empty()).then_some(token))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Serialize)]
struct AnalyzeEnvelope<'a> {
    client_id: &'a str,
    version: &'static str,
    request: &'a AnalysisRequest,
}

/// reqwest-backed [`AnalysisClient`].
pub struct HttpAnalysisClient {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
    client_id: String,
}

impl HttpAnalysisClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        if config.endpoint.trim().is_empty() {
            return Err(AnalysisError::Config("Analysis endpoint is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {e}")))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let client_id = format!(
            "digest-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.resolve_token()?,
            client,
            client_id,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        AnalysisError::Timeout
    } else {
        AnalysisError::Network(e.to_string())
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let envelope = AnalyzeEnvelope {
            client_id: &self.client_id,
            version: env!("CARGO_PKG_VERSION"),
            request,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&envelope);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        tracing::debug!(
            tier = %request.tier,
            request_id = %request.request_id,
            evidence = request.evidence.len(),
            children = request.children.len(),
            "Sending analysis request"
        );

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AnalysisError::RateLimited);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<AnalysisResponse>().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else {
                AnalysisError::Serialization(e.to_string())
            }
        })
    }
}

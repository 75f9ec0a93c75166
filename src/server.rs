//! HTTP status endpoint for a running scheduler.
//!
//! Lets a host (tray app, dashboard, shell script) watch the tiers without
//! reading `status.json`:
//!
//! ```text
//! GET  /health         liveness and version
//! GET  /status         per-tier execution state and counters
//! POST /trigger/:tier  run one tier now
//! ```

use crate::core::tier::Tier;
use crate::scheduler::{PipelineError, TierScheduler};
use crate::transparency::{RunOutcome, SchedulerStatus};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Manual trigger response
#[derive(Serialize)]
pub struct TriggerResponse {
    pub tier: Tier,
    pub outcome: RunOutcome,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(scheduler): State<TierScheduler>) -> Json<SchedulerStatus> {
    Json(scheduler.status())
}

/// POST /trigger/:tier
async fn trigger(
    State(scheduler): State<TierScheduler>,
    Path(name): Path<String>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let tier = Tier::from_name(&name).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "UNKNOWN_TIER",
            format!("Unknown tier '{name}'"),
        )
    })?;

    match scheduler.trigger(tier).await {
        Ok(outcome) => Ok(Json(TriggerResponse { tier, outcome })),
        Err(e @ PipelineError::Busy(_)) => Err(api_error(StatusCode::CONFLICT, "BUSY", e.to_string())),
        Err(e @ PipelineError::Analysis(_)) => {
            Err(api_error(StatusCode::BAD_GATEWAY, "ANALYSIS_ERROR", e.to_string()))
        }
        Err(e @ PipelineError::Store(_)) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORE_ERROR",
            e.to_string(),
        )),
    }
}

/// Build the router for a scheduler.
pub fn router(scheduler: TierScheduler) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/trigger/:tier", post(trigger))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(scheduler)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    scheduler: TierScheduler,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(scheduler);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Status server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

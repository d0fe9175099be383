//! HTTP API: scheduler extender prioritize endpoint, health checks and
//! Prometheus metrics

use balance_lib::{
    health::{ComponentStatus, HealthRegistry},
    models::{HostScore, WorkloadInstance},
    plugin::{self, CycleState, ScorePlugin},
    ScoringError,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub plugin: Arc<dyn ScorePlugin>,
    pub cycle_timeout: Duration,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        plugin: Arc<dyn ScorePlugin>,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            health_registry,
            plugin,
            cycle_timeout,
        }
    }
}

/// One placement decision: the instance and its feasible hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrioritizeRequest {
    pub instance: WorkloadInstance,
    pub hosts: Vec<String>,
    /// Overrides the configured cycle deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Score and normalize all candidate hosts in one cycle
async fn prioritize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PrioritizeRequest>,
) -> Result<Json<Vec<HostScore>>, (StatusCode, Json<ErrorResponse>)> {
    let timeout = request
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.cycle_timeout);
    let cycle = CycleState::new(timeout);

    debug!(
        instance = %request.instance.reference(),
        hosts = request.hosts.len(),
        timeout_ms = timeout.as_millis() as u64,
        "Prioritize request"
    );

    let result = plugin::prioritize(
        state.plugin.as_ref(),
        &cycle,
        &request.instance,
        &request.hosts,
    )
    .await;

    if !request.hosts.is_empty() {
        state.health_registry.record_cycle(&cycle.report()).await;
        let inventory_error = cycle.cohort().and_then(|c| match &c.defaulted {
            Some(ScoringError::Inventory(message)) => Some(message.as_str()),
            _ => None,
        });
        state.health_registry.record_inventory(inventory_error).await;
    }

    result.map(Json).map_err(|status| {
        let message = status.message().unwrap_or("scoring failed").to_string();
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: message }),
        )
    })
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/prioritize", post(prioritize))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

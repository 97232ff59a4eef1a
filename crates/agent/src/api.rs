//! HTTP API for triggers, health checks and Prometheus metrics
//!
//! The trigger endpoints expose the two entry points of the engine:
//! run one collection cycle and run a retention sweep. Failures come
//! back as structured JSON naming the failed sub-step, never as a raw
//! stack trace.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use collector_lib::{
    health::{ComponentStatus, HealthRegistry},
    store::TelemetryStore,
    Collector,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub collector: Arc<Collector>,
    pub store: Arc<dyn TelemetryStore>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        collector: Arc<Collector>,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            health_registry,
            collector,
            store,
        }
    }
}

/// Retention sweep request body
#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    #[serde(default = "default_sweep_days")]
    pub days: u32,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_sweep_days() -> u32 {
    30
}

/// Health check - 200 while at least degraded, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check - 200 once initialized and no component failed hard
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
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("metrics encoding failed: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Current persisted inventory
async fn containers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_containers().await {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": e.to_string(),
                "step": "inventory",
            })),
        ),
    }
}

/// Latest host-wide sample
async fn host(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.latest_host_sample().await {
        Ok(Some(sample)) => (StatusCode::OK, Json(serde_json::json!(sample))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "no host sample collected yet",
                "step": "host_sample",
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": e.to_string(),
                "step": "host_sample",
            })),
        ),
    }
}

/// Trigger one collection cycle. Idempotent; partial failures ride
/// along in the report's `errors` rather than failing the request.
async fn run_cycle(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Collection cycle triggered via API");
    let report = state.collector.run_cycle().await;
    (StatusCode::OK, Json(report))
}

/// Trigger a retention sweep (or dry run)
async fn run_sweep(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SweepRequest>,
) -> impl IntoResponse {
    info!(
        days = request.days,
        dry_run = request.dry_run,
        "Retention sweep triggered via API"
    );
    let report = state.collector.run_sweep(request.days, request.dry_run).await;
    (StatusCode::OK, Json(report))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/containers", get(containers))
        .route("/host", get(host))
        .route("/cycle", post(run_cycle))
        .route("/retention/sweep", post(run_sweep))
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

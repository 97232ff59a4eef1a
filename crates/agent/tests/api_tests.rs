//! Integration tests for the agent API endpoints

use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use collector_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    host::HostSampler,
    models::{ContainerStatus, ObservedContainer},
    runtime::{async_trait, ContainerRuntime},
    store::{MemoryStore, TelemetryStore},
    Collector, CollectorBuilder, CycleConfig,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Runtime with one fixed running container
struct StaticRuntime;

#[async_trait]
impl ContainerRuntime for StaticRuntime {
    async fn list_containers(&self) -> Result<Vec<ObservedContainer>> {
        Ok(vec![ObservedContainer {
            runtime_id: "abc123".to_string(),
            name: "web".to_string(),
            image: "nginx:1.25".to_string(),
            status: ContainerStatus::Running,
            ports: "0.0.0.0:8080->80/tcp".to_string(),
            created_at: Utc::now(),
        }])
    }

    async fn stats_line(&self, runtime_id: &str) -> Result<String> {
        Ok(format!(
            "{runtime_id} 0.50% 2.1MiB / 512MiB 0.41% 1.2kB / 800B 3MB / 1MB"
        ))
    }
}

#[derive(Clone)]
struct AppState {
    health_registry: HealthRegistry,
    collector: Arc<Collector>,
    store: Arc<MemoryStore>,
}

#[derive(Debug, Deserialize)]
struct SweepRequest {
    #[serde(default)]
    days: u32,
    #[serde(default)]
    dry_run: bool,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn containers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_containers().await {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string(), "step": "inventory"})),
        ),
    }
}

async fn run_cycle(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.collector.run_cycle().await;
    (StatusCode::OK, Json(report))
}

async fn run_sweep(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SweepRequest>,
) -> impl IntoResponse {
    let report = state.collector.run_sweep(request.days, request.dry_run).await;
    (StatusCode::OK, Json(report))
}

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/containers", get(containers))
        .route("/cycle", post(run_cycle))
        .route("/retention/sweep", post(run_sweep))
        .with_state(state)
}

async fn mock_proc() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    tokio::fs::create_dir_all(root.join("net")).await.unwrap();
    tokio::fs::write(
        root.join("stat"),
        "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 100 0 50 800 50 0 0 0 0 0\n",
    )
    .await
    .unwrap();
    tokio::fs::write(root.join("loadavg"), "0.10 0.10 0.10 1/100 42\n")
        .await
        .unwrap();
    tokio::fs::write(root.join("meminfo"), "MemTotal: 1000 kB\nMemFree: 600 kB\n")
        .await
        .unwrap();
    tokio::fs::write(
        root.join("net/dev"),
        "h1\nh2\n eth0: 100 1 0 0 0 0 0 0 200 1 0 0 0 0 0 0\n",
    )
    .await
    .unwrap();
    dir
}

async fn setup_test_app(proc_root: &TempDir) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new(Duration::from_secs(30));
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::STORE).await;

    let store = Arc::new(MemoryStore::new());
    let collector = Arc::new(
        CollectorBuilder::new()
            .runtime(Arc::new(StaticRuntime))
            .store(store.clone())
            .sampler(Arc::new(HostSampler::with_proc_root(proc_root.path())))
            .health(health_registry.clone())
            .host_name("test-host")
            .config(CycleConfig {
                container_delay: Duration::from_millis(1),
                ..CycleConfig::default()
            })
            .build()
            .unwrap(),
    );

    let state = Arc::new(AppState {
        health_registry,
        collector,
        store,
    });
    let router = create_test_router(state.clone());

    (router, state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let proc_root = mock_proc().await;
    let (app, _state) = setup_test_app(&proc_root).await;

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_unhealthy_returns_503() {
    let proc_root = mock_proc().await;
    let (app, state) = setup_test_app(&proc_root).await;

    state
        .health_registry
        .set_unhealthy(components::STORE, "connection pool exhausted")
        .await;

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_gates_on_initialization() {
    let proc_root = mock_proc().await;
    let (app, state) = setup_test_app(&proc_root).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;

    let response = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let proc_root = mock_proc().await;
    let (app, _state) = setup_test_app(&proc_root).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cycle_trigger_reports_counts() {
    let proc_root = mock_proc().await;
    let (app, state) = setup_test_app(&proc_root).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cycle")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["containers_observed"], 1);
    assert_eq!(report["containers_sampled"], 1);
    assert_eq!(report["host_sampled"], true);
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);

    assert_eq!(state.store.list_containers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_containers_endpoint_lists_inventory() {
    let proc_root = mock_proc().await;
    let (app, state) = setup_test_app(&proc_root).await;

    state.collector.run_cycle().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/containers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let records = body_json(response).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["runtime_id"], "abc123");
    assert_eq!(records[0]["status"], "running");
}

#[tokio::test]
async fn test_sweep_dry_run_returns_report_shape() {
    let proc_root = mock_proc().await;
    let (app, state) = setup_test_app(&proc_root).await;

    state.collector.run_cycle().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/retention/sweep")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"days": 0, "dry_run": true}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    // One container sample plus one host sample are older than a
    // zero-day cutoff; dry run counts without deleting.
    assert_eq!(report["metrics_deleted"], 2);
    assert_eq!(report["alerts_deleted"], 0);
    assert_eq!(report["scans_deleted"], 0);
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);

    let a_id = state.store.list_containers().await.unwrap()[0].internal_id;
    assert_eq!(
        state.store.samples_for_container(a_id).await.unwrap().len(),
        1
    );
}

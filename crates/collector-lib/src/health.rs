//! Health tracking for the telemetry agent
//!
//! Tracks per-component health for liveness/readiness probes and
//! watches collection-cycle staleness: a collector that has stopped
//! completing cycles is degraded even if no component reported a
//! failure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Experiencing issues but still operational
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const RUNTIME: &str = "runtime";
    pub const HOST_SAMPLER: &str = "host_sampler";
    pub const STORE: &str = "store";
    pub const BROADCASTER: &str = "broadcaster";
    pub const SWEEPER: &str = "sweeper";
}

/// Shared registry of component health and cycle recency
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    last_cycle: Arc<RwLock<Option<Instant>>>,
    /// Collector counts as stale past this window (3 intervals)
    staleness_window: Duration,
}

impl HealthRegistry {
    pub fn new(collection_interval: Duration) -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
            last_cycle: Arc::new(RwLock::new(None)),
            staleness_window: collection_interval * 3,
        }
    }

    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Mark one collection cycle as completed now
    pub async fn record_cycle(&self) {
        *self.last_cycle.write().await = Some(Instant::now());
    }

    /// Whether a cycle has completed within the staleness window
    pub async fn cycle_fresh(&self) -> bool {
        match *self.last_cycle.read().await {
            Some(at) => at.elapsed() < self.staleness_window,
            None => false,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let mut components = self.components.read().await.clone();

        // Cycle staleness surfaces as a degraded collector component
        // rather than a separate endpoint.
        if self.last_cycle.read().await.is_some() && !self.cycle_fresh().await {
            components.insert(
                "collector".to_string(),
                ComponentHealth::degraded("No completed collection cycle within 3 intervals"),
            );
        }

        let status = overall_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Agent not yet initialized".to_string()),
            };
        }

        let health = self.health().await;
        if health.status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

fn overall_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
    let mut has_degraded = false;
    for health in components.values() {
        match health.status {
            ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
            ComponentStatus::Degraded => has_degraded = true,
            ComponentStatus::Healthy => {}
        }
    }
    if has_degraded {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    }
}

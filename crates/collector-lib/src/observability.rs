//! Observability infrastructure for the telemetry agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, inventory size, persistence and
//!   broadcast counters, retention totals)
//! - Structured JSON event logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (seconds). Cycles include a ~1 s
/// CPU sampling window, so buckets stretch further than typical request
/// latencies.
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0];

static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    cycle_latency_seconds: Histogram,
    containers_inventoried: IntGauge,
    samples_persisted: IntCounter,
    collection_errors: IntCounter,
    broadcast_failures: IntCounter,
    alerts_created: IntCounter,
    rows_swept: IntCounter,
    last_cycle_timestamp: IntGauge,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "telemetry_agent_cycle_latency_seconds",
                "Wall-clock time of one full collection cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            containers_inventoried: register_int_gauge!(
                "telemetry_agent_containers_inventoried",
                "Containers in the persisted inventory after reconciliation"
            )
            .expect("Failed to register containers_inventoried"),

            samples_persisted: register_int_counter!(
                "telemetry_agent_samples_persisted_total",
                "Telemetry samples written to the store"
            )
            .expect("Failed to register samples_persisted"),

            collection_errors: register_int_counter!(
                "telemetry_agent_collection_errors_total",
                "Failed sub-steps across collection cycles"
            )
            .expect("Failed to register collection_errors"),

            broadcast_failures: register_int_counter!(
                "telemetry_agent_broadcast_failures_total",
                "Best-effort broadcasts that failed or timed out"
            )
            .expect("Failed to register broadcast_failures"),

            alerts_created: register_int_counter!(
                "telemetry_agent_alerts_created_total",
                "Alerts derived from scan findings"
            )
            .expect("Failed to register alerts_created"),

            rows_swept: register_int_counter!(
                "telemetry_agent_rows_swept_total",
                "Rows deleted by retention sweeps"
            )
            .expect("Failed to register rows_swept"),

            last_cycle_timestamp: register_int_gauge!(
                "telemetry_agent_last_cycle_timestamp_seconds",
                "Unix time of the last completed collection cycle"
            )
            .expect("Failed to register last_cycle_timestamp"),
        }
    }
}

/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn set_containers_inventoried(&self, count: i64) {
        self.inner().containers_inventoried.set(count);
    }

    pub fn inc_samples_persisted(&self) {
        self.inner().samples_persisted.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_broadcast_failures(&self) {
        self.inner().broadcast_failures.inc();
    }

    pub fn inc_alerts_created(&self) {
        self.inner().alerts_created.inc();
    }

    pub fn add_rows_swept(&self, rows: u64) {
        self.inner().rows_swept.inc_by(rows);
    }

    pub fn set_last_cycle_timestamp(&self, unix_secs: i64) {
        self.inner().last_cycle_timestamp.set(unix_secs);
    }
}

/// Structured logger for significant agent events
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "agent_started",
            host = %self.host_name,
            agent_version = %version,
            collection_interval_secs = interval_secs,
            "Telemetry agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host_name,
            reason = %reason,
            "Telemetry agent shutting down"
        );
    }

    pub fn log_cycle(
        &self,
        observed: usize,
        sampled: usize,
        deleted: usize,
        host_sampled: bool,
        errors: usize,
        elapsed_ms: u128,
    ) {
        if errors > 0 {
            warn!(
                event = "cycle_complete",
                host = %self.host_name,
                containers_observed = observed,
                containers_sampled = sampled,
                containers_deleted = deleted,
                host_sampled = host_sampled,
                errors = errors,
                elapsed_ms = elapsed_ms,
                "Collection cycle completed with errors"
            );
        } else {
            info!(
                event = "cycle_complete",
                host = %self.host_name,
                containers_observed = observed,
                containers_sampled = sampled,
                containers_deleted = deleted,
                host_sampled = host_sampled,
                elapsed_ms = elapsed_ms,
                "Collection cycle complete"
            );
        }
    }

    pub fn log_sweep(
        &self,
        days: u32,
        dry_run: bool,
        metrics: u64,
        alerts: u64,
        scans: u64,
        errors: usize,
    ) {
        info!(
            event = "retention_sweep",
            host = %self.host_name,
            days = days,
            dry_run = dry_run,
            metrics_deleted = metrics,
            alerts_deleted = alerts,
            scans_deleted = scans,
            errors = errors,
            "Retention sweep finished"
        );
    }
}

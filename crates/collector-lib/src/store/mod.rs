//! Persistence port
//!
//! The relational store backing the dashboard is an external
//! collaborator; the collector reaches it only through the
//! [`TelemetryStore`] trait. The referential invariants (container
//! references resolve at write time, deletes cascade) are enforced by
//! this core, not assumed of the backend.

mod memory;

pub use memory::MemoryStore;

use crate::models::{
    Alert, AlertSeverity, ContainerRecord, HostSample, ObservedContainer, ScanRecord,
    TelemetrySample,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use async_trait::async_trait;

/// Typed failures of the persistence port
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container {0} not found")]
    ContainerNotFound(i64),
    #[error("alert {0} not found")]
    AlertNotFound(i64),
    #[error("scan {0} not found")]
    ScanNotFound(i64),
    #[error("scan {0} is already in a terminal state")]
    TerminalScan(i64),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An alert before the store has assigned identity
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub severity: AlertSeverity,
    pub message: String,
    pub source: String,
    pub container_internal_id: Option<i64>,
}

/// Unresolved alert counts used by the security score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnresolvedCounts {
    pub critical: u64,
    pub high: u64,
}

/// Trait for persistence implementations
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    // Inventory

    /// Insert or update a container keyed by its runtime id. Updates
    /// touch the mutable fields (name, image, status, ports) and
    /// `updated_at`; identity and `created_at` are preserved.
    async fn upsert_container(&self, observed: &ObservedContainer) -> StoreResult<ContainerRecord>;

    async fn list_containers(&self) -> StoreResult<Vec<ContainerRecord>>;

    async fn get_container(&self, internal_id: i64) -> StoreResult<Option<ContainerRecord>>;

    /// Hard delete with cascade: the container's samples, alerts and
    /// scans go in the same operation. Deleting an absent container is a
    /// no-op, so repeats are safe.
    async fn delete_container(&self, internal_id: i64) -> StoreResult<()>;

    // Telemetry

    /// Insert one container sample. Fails with [`StoreError::ContainerNotFound`]
    /// when the referenced container does not exist at write time.
    async fn insert_sample(&self, sample: TelemetrySample) -> StoreResult<()>;

    async fn samples_for_container(&self, internal_id: i64)
        -> StoreResult<Vec<TelemetrySample>>;

    async fn insert_host_sample(&self, sample: HostSample) -> StoreResult<()>;

    async fn latest_host_sample(&self) -> StoreResult<Option<HostSample>>;

    // Alerts

    async fn insert_alert(&self, alert: NewAlert) -> StoreResult<Alert>;

    /// Resolution is the only permitted mutation of an alert.
    async fn resolve_alert(&self, id: i64) -> StoreResult<Alert>;

    /// Unresolved CRITICAL/HIGH counts for one container, or for the
    /// host when `container_internal_id` is None.
    async fn unresolved_alert_counts(
        &self,
        container_internal_id: Option<i64>,
    ) -> StoreResult<UnresolvedCounts>;

    // Scans

    /// Create a scan in the running state.
    async fn insert_scan(
        &self,
        container_internal_id: i64,
        scan_type: &str,
    ) -> StoreResult<ScanRecord>;

    /// Transition a running scan to completed. A second transition of
    /// any kind fails with [`StoreError::TerminalScan`].
    async fn complete_scan(
        &self,
        id: i64,
        result: serde_json::Value,
        summary: &str,
        duration_millis: i64,
    ) -> StoreResult<ScanRecord>;

    /// Transition a running scan to failed.
    async fn fail_scan(&self, id: i64, summary: &str) -> StoreResult<ScanRecord>;

    // Retention primitives. "Samples" covers container and host samples
    // alike; both are unconditional below the cutoff.

    async fn delete_samples_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
    async fn count_samples_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn delete_resolved_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
    async fn count_resolved_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn delete_completed_scans_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
    async fn count_completed_scans_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

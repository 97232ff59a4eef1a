//! In-memory reference store
//!
//! Backs the test suite and single-process deployments that run without
//! an external database. Cascade deletion and the scan state machine are
//! enforced here so any swapped-in backend has a behavioral reference.

use super::{NewAlert, StoreError, StoreResult, TelemetryStore, UnresolvedCounts};
use crate::models::{
    Alert, AlertSeverity, ContainerRecord, HostSample, ObservedContainer, ScanRecord, ScanStatus,
    TelemetrySample,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// DashMap tables for keyed records, RwLock vectors for append-mostly
/// sample logs, one shared id sequence.
#[derive(Default)]
pub struct MemoryStore {
    sequence: AtomicI64,
    containers: DashMap<i64, ContainerRecord>,
    /// runtime_id -> internal_id
    runtime_index: DashMap<String, i64>,
    samples: RwLock<Vec<TelemetrySample>>,
    host_samples: RwLock<Vec<HostSample>>,
    alerts: DashMap<i64, Alert>,
    scans: DashMap<i64, ScanRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn samples_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<TelemetrySample>> {
        self.samples.write().unwrap_or_else(|e| e.into_inner())
    }

    fn samples_ref(&self) -> std::sync::RwLockReadGuard<'_, Vec<TelemetrySample>> {
        self.samples.read().unwrap_or_else(|e| e.into_inner())
    }

    fn host_samples_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<HostSample>> {
        self.host_samples.write().unwrap_or_else(|e| e.into_inner())
    }

    fn host_samples_ref(&self) -> std::sync::RwLockReadGuard<'_, Vec<HostSample>> {
        self.host_samples.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn upsert_container(&self, observed: &ObservedContainer) -> StoreResult<ContainerRecord> {
        if let Some(internal_id) = self.runtime_index.get(&observed.runtime_id).map(|r| *r) {
            let mut entry = self
                .containers
                .get_mut(&internal_id)
                .ok_or(StoreError::ContainerNotFound(internal_id))?;
            entry.name = observed.name.clone();
            entry.image = observed.image.clone();
            entry.status = observed.status;
            entry.ports = observed.ports.clone();
            entry.updated_at = Utc::now();
            return Ok(entry.clone());
        }

        let now = Utc::now();
        let record = ContainerRecord {
            internal_id: self.next_id(),
            runtime_id: observed.runtime_id.clone(),
            name: observed.name.clone(),
            image: observed.image.clone(),
            status: observed.status,
            ports: observed.ports.clone(),
            created_at: observed.created_at,
            updated_at: now,
        };
        self.runtime_index
            .insert(record.runtime_id.clone(), record.internal_id);
        self.containers.insert(record.internal_id, record.clone());
        Ok(record)
    }

    async fn list_containers(&self) -> StoreResult<Vec<ContainerRecord>> {
        Ok(self.containers.iter().map(|r| r.value().clone()).collect())
    }

    async fn get_container(&self, internal_id: i64) -> StoreResult<Option<ContainerRecord>> {
        Ok(self.containers.get(&internal_id).map(|r| r.clone()))
    }

    async fn delete_container(&self, internal_id: i64) -> StoreResult<()> {
        let Some((_, record)) = self.containers.remove(&internal_id) else {
            return Ok(());
        };
        self.runtime_index.remove(&record.runtime_id);

        // Cascade in the same operation: dependent rows never outlive
        // their container.
        self.samples_mut()
            .retain(|s| s.container_internal_id != internal_id);
        self.alerts
            .retain(|_, a| a.container_internal_id != Some(internal_id));
        self.scans
            .retain(|_, s| s.container_internal_id != internal_id);
        Ok(())
    }

    async fn insert_sample(&self, sample: TelemetrySample) -> StoreResult<()> {
        if !self.containers.contains_key(&sample.container_internal_id) {
            return Err(StoreError::ContainerNotFound(sample.container_internal_id));
        }
        self.samples_mut().push(sample);
        Ok(())
    }

    async fn samples_for_container(
        &self,
        internal_id: i64,
    ) -> StoreResult<Vec<TelemetrySample>> {
        Ok(self
            .samples_ref()
            .iter()
            .filter(|s| s.container_internal_id == internal_id)
            .cloned()
            .collect())
    }

    async fn insert_host_sample(&self, sample: HostSample) -> StoreResult<()> {
        self.host_samples_mut().push(sample);
        Ok(())
    }

    async fn latest_host_sample(&self) -> StoreResult<Option<HostSample>> {
        Ok(self.host_samples_ref().last().cloned())
    }

    async fn insert_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        if let Some(container_id) = alert.container_internal_id {
            if !self.containers.contains_key(&container_id) {
                return Err(StoreError::ContainerNotFound(container_id));
            }
        }

        let record = Alert {
            id: self.next_id(),
            severity: alert.severity,
            message: alert.message,
            source: alert.source,
            container_internal_id: alert.container_internal_id,
            resolved: false,
            timestamp: Utc::now(),
        };
        self.alerts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn resolve_alert(&self, id: i64) -> StoreResult<Alert> {
        let mut entry = self.alerts.get_mut(&id).ok_or(StoreError::AlertNotFound(id))?;
        entry.resolved = true;
        Ok(entry.clone())
    }

    async fn unresolved_alert_counts(
        &self,
        container_internal_id: Option<i64>,
    ) -> StoreResult<UnresolvedCounts> {
        let mut counts = UnresolvedCounts::default();
        for alert in self.alerts.iter() {
            if alert.resolved || alert.container_internal_id != container_internal_id {
                continue;
            }
            match alert.severity {
                AlertSeverity::Critical => counts.critical += 1,
                AlertSeverity::High => counts.high += 1,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn insert_scan(
        &self,
        container_internal_id: i64,
        scan_type: &str,
    ) -> StoreResult<ScanRecord> {
        if !self.containers.contains_key(&container_internal_id) {
            return Err(StoreError::ContainerNotFound(container_internal_id));
        }

        let record = ScanRecord {
            id: self.next_id(),
            container_internal_id,
            scan_type: scan_type.to_string(),
            status: ScanStatus::Running,
            result: None,
            summary: String::new(),
            duration_millis: None,
            timestamp: Utc::now(),
        };
        self.scans.insert(record.id, record.clone());
        Ok(record)
    }

    async fn complete_scan(
        &self,
        id: i64,
        result: serde_json::Value,
        summary: &str,
        duration_millis: i64,
    ) -> StoreResult<ScanRecord> {
        let mut entry = self.scans.get_mut(&id).ok_or(StoreError::ScanNotFound(id))?;
        if entry.status.is_terminal() {
            return Err(StoreError::TerminalScan(id));
        }
        entry.status = ScanStatus::Completed;
        entry.result = Some(result);
        entry.summary = summary.to_string();
        entry.duration_millis = Some(duration_millis);
        Ok(entry.clone())
    }

    async fn fail_scan(&self, id: i64, summary: &str) -> StoreResult<ScanRecord> {
        let mut entry = self.scans.get_mut(&id).ok_or(StoreError::ScanNotFound(id))?;
        if entry.status.is_terminal() {
            return Err(StoreError::TerminalScan(id));
        }
        entry.status = ScanStatus::Failed;
        entry.summary = summary.to_string();
        Ok(entry.clone())
    }

    async fn delete_samples_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut deleted = 0u64;
        {
            let mut samples = self.samples_mut();
            let before = samples.len();
            samples.retain(|s| s.timestamp >= cutoff);
            deleted += (before - samples.len()) as u64;
        }
        {
            let mut host_samples = self.host_samples_mut();
            let before = host_samples.len();
            host_samples.retain(|s| s.timestamp >= cutoff);
            deleted += (before - host_samples.len()) as u64;
        }
        Ok(deleted)
    }

    async fn count_samples_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let samples = self.samples_ref().iter().filter(|s| s.timestamp < cutoff).count();
        let host = self
            .host_samples_ref()
            .iter()
            .filter(|s| s.timestamp < cutoff)
            .count();
        Ok((samples + host) as u64)
    }

    async fn delete_resolved_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.alerts.len();
        self.alerts
            .retain(|_, a| !(a.resolved && a.timestamp < cutoff));
        Ok((before - self.alerts.len()) as u64)
    }

    async fn count_resolved_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self
            .alerts
            .iter()
            .filter(|a| a.resolved && a.timestamp < cutoff)
            .count() as u64)
    }

    async fn delete_completed_scans_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let before = self.scans.len();
        self.scans
            .retain(|_, s| !(s.status == ScanStatus::Completed && s.timestamp < cutoff));
        Ok((before - self.scans.len()) as u64)
    }

    async fn count_completed_scans_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self
            .scans
            .iter()
            .filter(|s| s.status == ScanStatus::Completed && s.timestamp < cutoff)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerStatus;

    fn observed(runtime_id: &str, status: ContainerStatus) -> ObservedContainer {
        ObservedContainer {
            runtime_id: runtime_id.to_string(),
            name: format!("{runtime_id}-name"),
            image: "alpine:3.19".to_string(),
            status,
            ports: String::new(),
            created_at: Utc::now(),
        }
    }

    fn sample_for(internal_id: i64) -> TelemetrySample {
        TelemetrySample {
            container_internal_id: internal_id,
            cpu_usage_percent: 1.5,
            mem_usage_percent: 10.0,
            mem_limit_bytes: Some(512.0 * 1024.0 * 1024.0),
            net_in_bytes: 100.0,
            net_out_bytes: 50.0,
            disk_read_bytes: None,
            disk_write_bytes: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_preserves_identity() {
        let store = MemoryStore::new();

        let first = store
            .upsert_container(&observed("abc", ContainerStatus::Running))
            .await
            .unwrap();

        let mut changed = observed("abc", ContainerStatus::Stopped);
        changed.image = "alpine:3.20".to_string();
        let second = store.upsert_container(&changed).await.unwrap();

        assert_eq!(first.internal_id, second.internal_id);
        assert_eq!(second.status, ContainerStatus::Stopped);
        assert_eq!(second.image, "alpine:3.20");
        assert_eq!(store.list_containers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sample_requires_live_container() {
        let store = MemoryStore::new();
        let err = store.insert_sample(sample_for(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::ContainerNotFound(42)));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let record = store
            .upsert_container(&observed("abc", ContainerStatus::Running))
            .await
            .unwrap();
        let id = record.internal_id;

        store.insert_sample(sample_for(id)).await.unwrap();
        store
            .insert_alert(NewAlert {
                severity: AlertSeverity::High,
                message: "CVE-2024-0001 in openssl".to_string(),
                source: "trivy".to_string(),
                container_internal_id: Some(id),
            })
            .await
            .unwrap();
        let scan = store.insert_scan(id, "vulnerability").await.unwrap();

        store.delete_container(id).await.unwrap();

        assert!(store.get_container(id).await.unwrap().is_none());
        assert!(store.samples_for_container(id).await.unwrap().is_empty());
        assert_eq!(
            store
                .unresolved_alert_counts(Some(id))
                .await
                .unwrap(),
            UnresolvedCounts::default()
        );
        assert!(matches!(
            store.complete_scan(scan.id, serde_json::json!({}), "", 1).await,
            Err(StoreError::ScanNotFound(_))
        ));

        // Repeat delete is a no-op
        store.delete_container(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_terminal_states_are_immutable() {
        let store = MemoryStore::new();
        let record = store
            .upsert_container(&observed("abc", ContainerStatus::Running))
            .await
            .unwrap();

        let scan = store
            .insert_scan(record.internal_id, "vulnerability")
            .await
            .unwrap();
        assert_eq!(scan.status, ScanStatus::Running);
        assert!(scan.result.is_none());

        let done = store
            .complete_scan(scan.id, serde_json::json!({"findings": []}), "clean", 1200)
            .await
            .unwrap();
        assert_eq!(done.status, ScanStatus::Completed);
        assert_eq!(done.duration_millis, Some(1200));

        assert!(matches!(
            store.complete_scan(scan.id, serde_json::json!({}), "", 1).await,
            Err(StoreError::TerminalScan(_))
        ));
        assert!(matches!(
            store.fail_scan(scan.id, "late failure").await,
            Err(StoreError::TerminalScan(_))
        ));
    }

    #[tokio::test]
    async fn test_alert_resolution_and_counts() {
        let store = MemoryStore::new();
        let record = store
            .upsert_container(&observed("abc", ContainerStatus::Running))
            .await
            .unwrap();
        let id = record.internal_id;

        let critical = store
            .insert_alert(NewAlert {
                severity: AlertSeverity::Critical,
                message: "CVE-2024-0002 in zlib".to_string(),
                source: "trivy".to_string(),
                container_internal_id: Some(id),
            })
            .await
            .unwrap();
        store
            .insert_alert(NewAlert {
                severity: AlertSeverity::High,
                message: "CVE-2024-0003 in curl".to_string(),
                source: "trivy".to_string(),
                container_internal_id: Some(id),
            })
            .await
            .unwrap();

        let counts = store.unresolved_alert_counts(Some(id)).await.unwrap();
        assert_eq!(counts, UnresolvedCounts { critical: 1, high: 1 });

        store.resolve_alert(critical.id).await.unwrap();
        let counts = store.unresolved_alert_counts(Some(id)).await.unwrap();
        assert_eq!(counts, UnresolvedCounts { critical: 0, high: 1 });

        // Host-scoped alerts are counted separately
        assert_eq!(
            store.unresolved_alert_counts(None).await.unwrap(),
            UnresolvedCounts::default()
        );
    }

    #[tokio::test]
    async fn test_retention_primitives() {
        let store = MemoryStore::new();
        let record = store
            .upsert_container(&observed("abc", ContainerStatus::Running))
            .await
            .unwrap();
        store.insert_sample(sample_for(record.internal_id)).await.unwrap();

        let future = Utc::now() + chrono::Duration::days(1);
        let past = Utc::now() - chrono::Duration::days(1);

        assert_eq!(store.count_samples_before(past).await.unwrap(), 0);
        assert_eq!(store.count_samples_before(future).await.unwrap(), 1);
        assert_eq!(store.delete_samples_before(past).await.unwrap(), 0);
        assert_eq!(store.delete_samples_before(future).await.unwrap(), 1);
        assert!(store
            .samples_for_container(record.internal_id)
            .await
            .unwrap()
            .is_empty());
    }
}

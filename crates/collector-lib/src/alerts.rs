//! Alert derivation from scan findings
//!
//! Runs off the scan-completion path, independent of the polling cycle.
//! Only HIGH and CRITICAL findings become alerts; LOW/MEDIUM stay
//! visible inside the scan's own result payload so operators are not
//! flooded with noise.

use crate::broadcast::{publish_best_effort, Broadcaster, ALERT_CHANNEL};
use crate::models::{Alert, AlertSeverity, Finding, ScanRecord};
use crate::observability::CollectorMetrics;
use crate::store::{NewAlert, TelemetryStore, UnresolvedCounts};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Findings at or above this severity become alerts
const ALERT_THRESHOLD: AlertSeverity = AlertSeverity::High;

/// Per-unresolved-alert penalties for the security score
const CRITICAL_PENALTY: i64 = 10;
const HIGH_PENALTY: i64 = 5;

/// Deterministic linear penalty score, clamped to [0, 100].
///
/// Intentionally not configurable.
pub fn security_score(counts: UnresolvedCounts) -> u8 {
    let score =
        100 - CRITICAL_PENALTY * counts.critical as i64 - HIGH_PENALTY * counts.high as i64;
    score.clamp(0, 100) as u8
}

/// Maps completed-scan findings to alert records
pub struct AlertDeriver {
    store: Arc<dyn TelemetryStore>,
    broadcaster: Arc<dyn Broadcaster>,
    broadcast_timeout: Duration,
    metrics: CollectorMetrics,
}

impl AlertDeriver {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        broadcaster: Arc<dyn Broadcaster>,
        broadcast_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            broadcast_timeout,
            metrics: CollectorMetrics::new(),
        }
    }

    /// Derive alerts for a scan that just completed with findings.
    ///
    /// Each created alert is broadcast best-effort after it is
    /// persisted. Persistence failures for one finding do not stop the
    /// rest.
    pub async fn derive(&self, scan: &ScanRecord, scanner: &str, findings: &[Finding]) -> Result<Vec<Alert>> {
        let mut created = Vec::new();

        for finding in findings {
            if finding.severity < ALERT_THRESHOLD {
                continue;
            }

            let new_alert = NewAlert {
                severity: finding.severity,
                message: compose_message(scan, finding),
                source: scanner.to_string(),
                container_internal_id: Some(scan.container_internal_id),
            };

            match self.store.insert_alert(new_alert).await {
                Ok(alert) => {
                    self.metrics.inc_alerts_created();
                    info!(
                        alert_id = alert.id,
                        severity = %alert.severity,
                        container_internal_id = scan.container_internal_id,
                        source = %scanner,
                        "Alert created from scan finding"
                    );
                    publish_best_effort(
                        self.broadcaster.as_ref(),
                        ALERT_CHANNEL,
                        &alert,
                        self.broadcast_timeout,
                    )
                    .await;
                    created.push(alert);
                }
                Err(e) => {
                    warn!(
                        finding_id = %finding.id,
                        error = %e,
                        "Failed to persist alert for finding"
                    );
                }
            }
        }

        Ok(created)
    }

    /// Security score for one container, or the host when None
    pub async fn score(&self, container_internal_id: Option<i64>) -> Result<u8> {
        let counts = self
            .store
            .unresolved_alert_counts(container_internal_id)
            .await?;
        Ok(security_score(counts))
    }
}

/// Alert message composed from the finding's identifying fields
fn compose_message(scan: &ScanRecord, finding: &Finding) -> String {
    format!(
        "{} scan found {}: {}",
        scan.scan_type, finding.id, finding.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NoopBroadcaster;
    use crate::models::{ContainerStatus, ObservedContainer};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn finding(severity: AlertSeverity, id: &str) -> Finding {
        Finding {
            severity,
            id: id.to_string(),
            title: format!("{id} in libexample"),
            description: String::new(),
        }
    }

    async fn scanned_container(store: &MemoryStore) -> ScanRecord {
        let record = store
            .upsert_container(&ObservedContainer {
                runtime_id: "abc".to_string(),
                name: "web".to_string(),
                image: "nginx:1.25".to_string(),
                status: ContainerStatus::Running,
                ports: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let scan = store
            .insert_scan(record.internal_id, "vulnerability")
            .await
            .unwrap();
        store
            .complete_scan(
                scan.id,
                serde_json::json!({"findings": 2}),
                "2 findings",
                900,
            )
            .await
            .unwrap()
    }

    fn deriver(store: Arc<MemoryStore>) -> AlertDeriver {
        AlertDeriver::new(store, Arc::new(NoopBroadcaster), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_only_high_and_critical_become_alerts() {
        let store = Arc::new(MemoryStore::new());
        let scan = scanned_container(&store).await;
        let deriver = deriver(store.clone());

        let created = deriver
            .derive(
                &scan,
                "trivy",
                &[
                    finding(AlertSeverity::Critical, "CVE-2024-0001"),
                    finding(AlertSeverity::Low, "CVE-2024-0002"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].severity, AlertSeverity::Critical);
        assert_eq!(created[0].source, "trivy");
        assert_eq!(
            created[0].container_internal_id,
            Some(scan.container_internal_id)
        );
        assert!(created[0].message.contains("CVE-2024-0001"));
        assert!(!created[0].resolved);

        let counts = store
            .unresolved_alert_counts(Some(scan.container_internal_id))
            .await
            .unwrap();
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.high, 0);
    }

    #[tokio::test]
    async fn test_medium_findings_never_alert() {
        let store = Arc::new(MemoryStore::new());
        let scan = scanned_container(&store).await;
        let deriver = deriver(store.clone());

        let created = deriver
            .derive(
                &scan,
                "clamav",
                &[
                    finding(AlertSeverity::Medium, "PUA.Win.Tool"),
                    finding(AlertSeverity::Low, "Heuristic.Weak"),
                ],
            )
            .await
            .unwrap();

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_high_findings_alert() {
        let store = Arc::new(MemoryStore::new());
        let scan = scanned_container(&store).await;
        let deriver = deriver(store.clone());

        let created = deriver
            .derive(&scan, "trivy", &[finding(AlertSeverity::High, "CVE-2024-0003")])
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].severity, AlertSeverity::High);
    }

    #[test]
    fn test_security_score_penalties() {
        assert_eq!(security_score(UnresolvedCounts::default()), 100);
        assert_eq!(
            security_score(UnresolvedCounts { critical: 1, high: 0 }),
            90
        );
        assert_eq!(
            security_score(UnresolvedCounts { critical: 0, high: 1 }),
            95
        );
        assert_eq!(
            security_score(UnresolvedCounts { critical: 2, high: 3 }),
            65
        );
    }

    #[test]
    fn test_security_score_clamps_at_zero() {
        assert_eq!(
            security_score(UnresolvedCounts {
                critical: 50,
                high: 50
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_score_reflects_resolution() {
        let store = Arc::new(MemoryStore::new());
        let scan = scanned_container(&store).await;
        let deriver = deriver(store.clone());

        let created = deriver
            .derive(
                &scan,
                "trivy",
                &[
                    finding(AlertSeverity::Critical, "CVE-2024-0001"),
                    finding(AlertSeverity::High, "CVE-2024-0002"),
                ],
            )
            .await
            .unwrap();

        let container = Some(scan.container_internal_id);
        assert_eq!(deriver.score(container).await.unwrap(), 85);

        store.resolve_alert(created[0].id).await.unwrap();
        assert_eq!(deriver.score(container).await.unwrap(), 95);
    }
}

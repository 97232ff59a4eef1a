//! Core data models for the telemetry agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running/stopped classification of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
}

impl ContainerStatus {
    /// Classify the runtime's human-readable status string.
    ///
    /// Docker prints "Up 3 hours" for running containers and
    /// "Exited (0) 2 days ago" for stopped ones; other runtimes report a
    /// plain "running". Anything without a running marker is Stopped.
    pub fn from_runtime_status(status: &str) -> Self {
        let lower = status.to_ascii_lowercase();
        if lower.contains("running") || lower.starts_with("up") {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A container as reported by the runtime's list query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedContainer {
    /// Stable external id owned by the runtime
    pub runtime_id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    /// Opaque serialized port mapping text
    pub ports: String,
    pub created_at: DateTime<Utc>,
}

/// A container in the persisted inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Store-owned identity
    pub internal_id: i64,
    /// Stable external id from the container runtime
    pub runtime_id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub ports: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One resource-usage measurement for a container. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub container_internal_id: i64,
    /// Not clamped above 100: spikes past 100% on multi-core hosts are
    /// legitimate and preserved.
    pub cpu_usage_percent: f64,
    pub mem_usage_percent: f64,
    /// None when the runtime reported no parseable limit. Zero would read
    /// as "no memory cap", which is a different statement.
    pub mem_limit_bytes: Option<f64>,
    pub net_in_bytes: f64,
    pub net_out_bytes: f64,
    pub disk_read_bytes: Option<f64>,
    pub disk_write_bytes: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One host-wide measurement. Immutable, one per cycle.
///
/// Network counters are cumulative since boot; consumers diff across
/// samples if they want a rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSample {
    pub cpu_usage_percent: f64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub ram_used_bytes: u64,
    pub ram_free_bytes: u64,
    pub ram_total_bytes: u64,
    pub ram_usage_percent: f64,
    pub disk_used_bytes: u64,
    pub disk_free_bytes: u64,
    pub disk_total_bytes: u64,
    pub disk_usage_percent: f64,
    pub net_in_bytes: u64,
    pub net_out_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

/// Alert severity, ordered LOW < MEDIUM < HIGH < CRITICAL
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "LOW"),
            AlertSeverity::Medium => write!(f, "MEDIUM"),
            AlertSeverity::High => write!(f, "HIGH"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A security-relevant alert. `resolved` is the only field operators may
/// mutate after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub severity: AlertSeverity,
    pub message: String,
    /// Origin system, e.g. the scanner name
    pub source: String,
    /// None for host-wide alerts
    pub container_internal_id: Option<i64>,
    pub resolved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Scan lifecycle state. Running transitions to a terminal state exactly
/// once; terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// One vulnerability/malware scan of a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    pub container_internal_id: i64,
    pub scan_type: String,
    pub status: ScanStatus,
    /// Opaque structured findings, null until completion
    pub result: Option<serde_json::Value>,
    pub summary: String,
    pub duration_millis: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// One structured result item from a security scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: AlertSeverity,
    /// Identifier such as a CVE id or malware signature name
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Outcome of one retention sweep (or dry run)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub metrics_deleted: u64,
    pub alerts_deleted: u64,
    pub scans_deleted: u64,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ContainerStatus::from_runtime_status("Up 3 hours"),
            ContainerStatus::Running
        );
        assert_eq!(
            ContainerStatus::from_runtime_status("running"),
            ContainerStatus::Running
        );
        assert_eq!(
            ContainerStatus::from_runtime_status("Exited (0) 2 days ago"),
            ContainerStatus::Stopped
        );
        assert_eq!(
            ContainerStatus::from_runtime_status("Created"),
            ContainerStatus::Stopped
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_string(&AlertSeverity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn test_scan_status_terminal() {
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
    }
}

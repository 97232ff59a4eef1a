//! Agent configuration

use anyhow::Result;
use collector_lib::CycleConfig;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, sourced from AGENT_* environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host name reported in structured log events
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// API server port for trigger/health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Container runtime binary
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,

    /// Collection cycle interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Throttle between per-container stats queries in milliseconds
    #[serde(default = "default_container_delay")]
    pub container_delay_ms: u64,

    /// Bound on each best-effort broadcast attempt in milliseconds
    #[serde(default = "default_broadcast_timeout")]
    pub broadcast_timeout_ms: u64,

    /// Retention horizon for automatic sweeps in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Cadence of automatic retention sweeps in seconds
    #[serde(default = "default_retention_interval")]
    pub retention_interval_secs: u64,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_collection_interval() -> u64 {
    30
}

fn default_container_delay() -> u64 {
    200
}

fn default_broadcast_timeout() -> u64 {
    2000
}

fn default_retention_days() -> u32 {
    30
}

fn default_retention_interval() -> u64 {
    6 * 60 * 60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            api_port: default_api_port(),
            runtime_binary: default_runtime_binary(),
            collection_interval_secs: default_collection_interval(),
            container_delay_ms: default_container_delay(),
            broadcast_timeout_ms: default_broadcast_timeout(),
            retention_days: default_retention_days(),
            retention_interval_secs: default_retention_interval(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            interval: Duration::from_secs(self.collection_interval_secs),
            container_delay: Duration::from_millis(self.container_delay_ms),
            broadcast_timeout: Duration::from_millis(self.broadcast_timeout_ms),
            retention_interval: Duration::from_secs(self.retention_interval_secs),
            retention_days: self.retention_days,
        }
    }
}

//! Docker CLI-backed runtime
//!
//! Talks to a Docker-compatible engine through its command-line client.
//! The list query uses tab-separated fields so names, status strings and
//! port mappings may contain spaces; the stats query emits the single
//! whitespace-separated line that [`super::parse_stats_line`] expects.

use super::ContainerRuntime;
use crate::models::{ContainerStatus, ObservedContainer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

const LIST_FORMAT: &str =
    "{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.CreatedAt}}";
const STATS_FORMAT: &str =
    "{{.ID}} {{.CPUPerc}} {{.MemUsage}} {{.MemPerc}} {{.NetIO}} {{.BlockIO}}";

/// Runtime implementation shelling out to the `docker` binary
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} {} exited with {}: {}",
                self.binary,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Parse one tab-separated line of list output
    fn parse_list_line(line: &str) -> Option<ObservedContainer> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return None;
        }

        Some(ObservedContainer {
            runtime_id: fields[0].to_string(),
            name: fields[1].to_string(),
            image: fields[2].to_string(),
            status: ContainerStatus::from_runtime_status(fields[3]),
            ports: fields[4].to_string(),
            created_at: parse_created_at(fields[5]),
        })
    }
}

/// Parse the runtime's creation timestamp ("2024-01-01 12:00:00 +0000 UTC").
///
/// The trailing zone abbreviation is informational; the numeric offset
/// carries the information. Unparseable input falls back to now so an
/// odd timestamp never drops the container from the inventory.
fn parse_created_at(raw: &str) -> DateTime<Utc> {
    let numeric: String = raw
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");

    match DateTime::parse_from_str(&numeric, "%Y-%m-%d %H:%M:%S %z") {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            debug!(raw = %raw, error = %e, "Unparseable container creation time");
            Utc::now()
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ObservedContainer>> {
        let stdout = self
            .run(&["ps", "-a", "--no-trunc", "--format", LIST_FORMAT])
            .await?;

        let containers = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(Self::parse_list_line)
            .collect();

        Ok(containers)
    }

    async fn stats_line(&self, runtime_id: &str) -> Result<String> {
        let stdout = self
            .run(&[
                "stats",
                "--no-stream",
                "--format",
                STATS_FORMAT,
                runtime_id,
            ])
            .await?;

        Ok(stdout.trim().to_string())
    }
}

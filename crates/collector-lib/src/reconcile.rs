//! Inventory reconciliation
//!
//! The runtime is the source of truth for which containers exist; the
//! persisted inventory self-heals toward it every cycle. One pass lists
//! everything the runtime knows (running and stopped), upserts each
//! record keyed by runtime id, then deletes persisted records the
//! runtime no longer reports.

use crate::runtime::ContainerRuntime;
use crate::store::TelemetryStore;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Net effect of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub observed: usize,
    pub upserted: usize,
    pub deleted: usize,
}

/// Converges the persisted inventory to the runtime's view
pub struct InventoryReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn TelemetryStore>,
}

impl InventoryReconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, store: Arc<dyn TelemetryStore>) -> Self {
        Self { runtime, store }
    }

    /// One reconciliation pass. Runtime unreachability is the caller's
    /// error to log; per-record store failures are logged here and do
    /// not abort the rest of the pass.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let observed = self
            .runtime
            .list_containers()
            .await
            .context("Runtime list query failed")?;

        let mut outcome = ReconcileOutcome {
            observed: observed.len(),
            ..Default::default()
        };

        let mut observed_ids: HashSet<String> = HashSet::with_capacity(observed.len());
        for container in &observed {
            observed_ids.insert(container.runtime_id.clone());
            match self.store.upsert_container(container).await {
                Ok(_) => outcome.upserted += 1,
                Err(e) => {
                    warn!(
                        runtime_id = %container.runtime_id,
                        error = %e,
                        "Failed to upsert container"
                    );
                }
            }
        }

        // An empty runtime response is far more likely a transient query
        // failure than an actually empty fleet; never treat it as
        // "delete everything".
        if observed_ids.is_empty() {
            debug!("Empty observed set, skipping inventory deletes");
            return Ok(outcome);
        }

        let persisted = self
            .store
            .list_containers()
            .await
            .context("Inventory list query failed")?;

        for record in persisted {
            if observed_ids.contains(&record.runtime_id) {
                continue;
            }
            match self.store.delete_container(record.internal_id).await {
                Ok(()) => {
                    info!(
                        runtime_id = %record.runtime_id,
                        name = %record.name,
                        "Container gone from runtime, removed from inventory"
                    );
                    outcome.deleted += 1;
                }
                Err(e) => {
                    warn!(
                        runtime_id = %record.runtime_id,
                        error = %e,
                        "Failed to delete vanished container"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

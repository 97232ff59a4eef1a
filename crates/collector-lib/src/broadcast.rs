//! Live fan-out gateway
//!
//! Newly persisted samples and alerts are pushed to live subscribers
//! through a channel-keyed publish port. The gateway is injected into
//! the orchestrator and the alert deriver at construction time; it is
//! never ambient global state, so tests run it as a no-op.
//!
//! Publishing is strictly best-effort and runs on a separate error path
//! from persistence: by the time a publish is attempted the row is
//! already stored, so a failed or timed-out publish costs live-update
//! latency, never data.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Channel key for one container's samples
pub fn container_channel(runtime_id: &str) -> String {
    format!("container:{runtime_id}")
}

/// Channel key for host-wide samples
pub const HOST_CHANNEL: &str = "host";

/// Channel key for alerts
pub const ALERT_CHANNEL: &str = "alerts";

/// Trait for subscriber fan-out implementations
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish a JSON payload to one channel. No delivery guarantee is
    /// assumed or required.
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<()>;
}

/// Broadcaster that drops everything; for tests and subscriber-less runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn publish(&self, _channel: &str, _payload: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Serialize and publish, bounding the attempt and swallowing failures.
///
/// Returns whether the publish went through, so callers can count
/// failures without acting on them.
pub async fn publish_best_effort<T: Serialize>(
    broadcaster: &dyn Broadcaster,
    channel: &str,
    payload: &T,
    timeout: Duration,
) -> bool {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(channel = %channel, error = %e, "Unserializable broadcast payload dropped");
            return false;
        }
    };

    match tokio::time::timeout(timeout, broadcaster.publish(channel, value)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(channel = %channel, error = %e, "Broadcast failed, subscribers will catch up");
            false
        }
        Err(_) => {
            warn!(
                channel = %channel,
                timeout_ms = timeout.as_millis() as u64,
                "Broadcast timed out"
            );
            false
        }
    }
}

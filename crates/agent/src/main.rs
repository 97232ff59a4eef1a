//! Telemetry agent - container monitoring collection daemon
//!
//! Runs the periodic collection cycle against the local container
//! runtime and host OS, and exposes trigger/health/metrics endpoints
//! for the dashboard layer.

use anyhow::Result;
use collector_lib::{
    broadcast::NoopBroadcaster,
    health::{components, HealthRegistry},
    host::HostSampler,
    observability::StructuredLogger,
    runtime::DockerRuntime,
    store::MemoryStore,
    CollectorBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-agent");

    let config = config::AgentConfig::load()?;
    let cycle_config = config.cycle_config();
    info!(
        host_name = %config.host_name,
        runtime_binary = %config.runtime_binary,
        interval_secs = config.collection_interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new(cycle_config.interval);
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::HOST_SAMPLER).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::BROADCASTER).await;
    health_registry.register(components::SWEEPER).await;

    let logger = StructuredLogger::new(&config.host_name);
    logger.log_startup(AGENT_VERSION, config.collection_interval_secs);

    let store = Arc::new(MemoryStore::new());
    let collector = Arc::new(
        CollectorBuilder::new()
            .runtime(Arc::new(DockerRuntime::new(&config.runtime_binary)))
            .store(store.clone())
            .sampler(Arc::new(HostSampler::new()))
            .broadcaster(Arc::new(NoopBroadcaster))
            .health(health_registry.clone())
            .host_name(&config.host_name)
            .config(cycle_config)
            .build()?,
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        collector.clone(),
        store,
    ));

    // Collection loop runs its first cycle eagerly
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let collector_handle = tokio::spawn(collector.clone().run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal, then let the loop finish its cycle
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(10), collector_handle).await;
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

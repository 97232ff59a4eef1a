//! Collector library for the container telemetry agent
//!
//! This crate provides the core functionality for:
//! - Parsing runtime stats output into structured samples
//! - Host-wide CPU/memory/disk/network sampling
//! - Reconciling the persisted inventory against the runtime
//! - Driving the periodic collection cycle
//! - Deriving alerts from scan findings
//! - Best-effort fan-out to live subscribers
//! - Retention-window cleanup
//! - Health checks and observability

pub mod alerts;
pub mod broadcast;
pub mod cycle;
pub mod health;
pub mod host;
pub mod models;
pub mod observability;
pub mod reconcile;
pub mod retention;
pub mod runtime;
pub mod store;
pub mod units;

pub use cycle::{Collector, CollectorBuilder, CycleConfig, CycleReport};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};

//! Container runtime access
//!
//! The runtime is an external collaborator reached through two queries:
//! a list of all containers (running and stopped) and a single tabular
//! stats line for one container. Implementations live behind the
//! [`ContainerRuntime`] trait so the orchestrator and tests never depend
//! on a concrete engine.

mod docker;
mod stats;

pub use docker::DockerRuntime;
pub use stats::{parse_stats_line, RuntimeStats};

use crate::models::ObservedContainer;
use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for container runtime implementations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List all containers known to the runtime, running and stopped,
    /// in a single pass.
    async fn list_containers(&self) -> Result<Vec<ObservedContainer>>;

    /// Fetch one whitespace-separated stats line for a container.
    ///
    /// An empty string means the container stopped between listing and
    /// sampling; callers treat that as "no sample this cycle", not an
    /// error.
    async fn stats_line(&self, runtime_id: &str) -> Result<String>;
}

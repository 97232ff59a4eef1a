//! Container Telemetry CLI
//!
//! A command-line tool for driving the telemetry agent: trigger
//! collection cycles, run retention sweeps, and inspect the container
//! inventory and agent health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{collect, inspect, retention};

/// Container Telemetry CLI
#[derive(Parser)]
#[command(name = "ctm")]
#[command(author, version, about = "CLI for the Container Telemetry agent", long_about = None)]
pub struct Cli {
    /// Agent API endpoint URL (can also be set via CTM_API_URL env var)
    #[arg(long, env = "CTM_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trigger one collection cycle
    Cycle,

    /// Run a retention sweep
    Sweep {
        /// Retention horizon in days
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Count what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// List the persisted container inventory
    Containers,

    /// Show the latest host-wide sample
    Host,

    /// Show agent component health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Cycle => {
            collect::run_cycle(&client, cli.format).await?;
        }
        Commands::Sweep { days, dry_run } => {
            retention::run_sweep(&client, days, dry_run, cli.format).await?;
        }
        Commands::Containers => {
            inspect::show_containers(&client, cli.format).await?;
        }
        Commands::Host => {
            inspect::show_host(&client, cli.format).await?;
        }
        Commands::Status => {
            inspect::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}

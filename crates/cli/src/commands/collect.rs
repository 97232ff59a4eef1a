//! Collection cycle trigger command

use crate::client::{ApiClient, CycleReport};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use colored::Colorize;

/// Trigger one collection cycle and report what it did
pub async fn run_cycle(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: CycleReport = client.post("/cycle", &serde_json::json!({})).await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::print_success(&format!(
        "Cycle complete: {} containers observed, {} sampled, {} removed, host sampled: {}",
        report.containers_observed,
        report.containers_sampled,
        report.containers_deleted,
        report.host_sampled
    ));

    for error in &report.errors {
        output::print_warning(&format!(
            "{} failed: {}",
            error.step.yellow(),
            error.detail
        ));
    }

    Ok(())
}

//! Retention sweep command

use crate::client::{ApiClient, SweepReport, SweepRequest};
use crate::output::{self, OutputFormat};
use anyhow::Result;

/// Run a retention sweep, or count what one would delete
pub async fn run_sweep(
    client: &ApiClient,
    days: u32,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = SweepRequest { days, dry_run };
    let report: SweepReport = client.post("/retention/sweep", &request).await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let verb = if dry_run { "would delete" } else { "deleted" };
    output::print_success(&format!(
        "Sweep ({days}d horizon) {verb}: {} samples, {} alerts, {} scans",
        report.metrics_deleted, report.alerts_deleted, report.scans_deleted
    ));

    for error in &report.errors {
        output::print_warning(&format!("partial failure: {error}"));
    }

    Ok(())
}

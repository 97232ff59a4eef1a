//! Inventory and agent status commands

use crate::client::{ApiClient, ContainerRecord, HealthResponse, HostSample};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::DateTime;
use tabled::Tabled;

#[derive(Tabled, serde::Serialize)]
struct ContainerRow {
    #[tabled(rename = "RUNTIME ID")]
    runtime_id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PORTS")]
    ports: String,
    #[tabled(rename = "CREATED")]
    created: String,
}

/// List the persisted container inventory
pub async fn show_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let records: Vec<ContainerRecord> = client.get("/containers").await?;

    let rows: Vec<ContainerRow> = records
        .into_iter()
        .map(|r| ContainerRow {
            runtime_id: truncate_id(&r.runtime_id),
            name: r.name,
            image: r.image,
            status: output::color_status(&r.status),
            ports: r.ports,
            created: format_timestamp(&r.created_at),
        })
        .collect();

    output::print_table(&rows, format);
    Ok(())
}

#[derive(Tabled, serde::Serialize)]
struct ComponentRow {
    #[tabled(rename = "COMPONENT")]
    component: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

/// Show agent component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("/healthz").await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("Agent: {}", output::color_status(&health.status));

    let mut rows: Vec<ComponentRow> = health
        .components
        .into_iter()
        .map(|(name, component)| ComponentRow {
            component: name,
            status: output::color_status(&component.status),
            message: component.message.unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.component.cmp(&b.component));

    output::print_table(&rows, format);
    Ok(())
}

#[derive(Tabled, serde::Serialize)]
struct HostRow {
    #[tabled(rename = "METRIC")]
    metric: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

/// Show the latest host-wide sample
pub async fn show_host(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let sample: HostSample = client.get("/host").await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&sample)?);
        return Ok(());
    }

    let rows = vec![
        HostRow {
            metric: "CPU usage".to_string(),
            value: format!("{:.1}%", sample.cpu_usage_percent),
        },
        HostRow {
            metric: "Load (1/5/15m)".to_string(),
            value: format!("{:.2} / {:.2} / {:.2}", sample.load_1, sample.load_5, sample.load_15),
        },
        HostRow {
            metric: "RAM".to_string(),
            value: format!(
                "{} / {} ({:.1}%)",
                output::format_bytes(sample.ram_used_bytes),
                output::format_bytes(sample.ram_total_bytes),
                sample.ram_usage_percent
            ),
        },
        HostRow {
            metric: "Disk (/)".to_string(),
            value: format!(
                "{} / {} ({:.1}%)",
                output::format_bytes(sample.disk_used_bytes),
                output::format_bytes(sample.disk_total_bytes),
                sample.disk_usage_percent
            ),
        },
        HostRow {
            metric: "Network in/out since boot".to_string(),
            value: format!(
                "{} / {}",
                output::format_bytes(sample.net_in_bytes),
                output::format_bytes(sample.net_out_bytes)
            ),
        },
        HostRow {
            metric: "Sampled at".to_string(),
            value: format_timestamp(&sample.timestamp),
        },
    ];

    output::print_table(&rows, format);
    Ok(())
}

/// Render an RFC 3339 timestamp in a compact local-free form
fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Runtime ids are long hashes; the short prefix is what operators type
fn truncate_id(id: &str) -> String {
    if id.len() > 12 {
        id[..12].to_string()
    } else {
        id.to_string()
    }
}

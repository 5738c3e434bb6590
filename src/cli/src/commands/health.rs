//! `cinegate health`: service status and the cache health surface.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include per-component checks
    #[arg(short, long)]
    detailed: bool,
}

#[derive(Serialize, Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency (ms)")]
    latency: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("?")
}

fn component_rows(report: &Value) -> Vec<ComponentRow> {
    report
        .get("components")
        .and_then(Value::as_array)
        .map(|components| {
            components
                .iter()
                .map(|c| ComponentRow {
                    name: str_field(c, "name").to_string(),
                    status: str_field(c, "status").to_string(),
                    latency: c
                        .get("latency_ms")
                        .and_then(Value::as_u64)
                        .map(|ms| ms.to_string())
                        .unwrap_or_else(|| "-".into()),
                    message: c.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn local_time(timestamp: &str) -> String {
    timestamp
        .parse::<DateTime<Utc>>()
        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.get_raw("/health").await?;

    if !matches!(format, OutputFormat::Table) {
        return output::print_item(&report, format);
    }

    let status = str_field(&report, "status");
    output::print_header("Cinegate Health");
    output::print_detail("Status", &output::status_word(status).to_string());
    output::print_detail("API URL", client.base_url());
    output::print_detail("Version", str_field(&report, "version"));
    if let Some(uptime) = report.get("uptime_secs").and_then(Value::as_u64) {
        output::print_detail("Uptime", &format!("{}h {}m {}s", uptime / 3600, uptime / 60 % 60, uptime % 60));
    }
    output::print_detail("Checked", &local_time(str_field(&report, "timestamp")));

    if let Some(cache) = report.get("cache") {
        output::print_header("Cache");
        output::print_detail("Backend", str_field(cache, "cacheBackend"));
        let healthy = cache.get("cacheHealthy").and_then(Value::as_bool).unwrap_or(false);
        output::print_detail("Healthy", &output::status_word(&healthy.to_string()).to_string());
        if let Some(reason) = cache.get("degradedReason").and_then(Value::as_str) {
            output::print_detail("Degraded Reason", reason);
        }
    }

    if args.detailed {
        output::print_header("Components");
        output::print_list(&component_rows(&report), format)?;
    }

    println!();
    match status {
        "healthy" => output::print_success("All systems operational"),
        "degraded" => output::print_warning("Serving with reduced capability"),
        other => output::print_error(&format!("Service status: {}", other)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_rows() {
        let report = serde_json::json!({
            "components": [
                {"name": "cache", "status": "degraded", "message": "remote cache circuit open"},
                {"name": "video_host", "status": "healthy", "latency_ms": 42}
            ]
        });
        let rows = component_rows(&report);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].latency, "-");
        assert_eq!(rows[1].latency, "42");
    }
}

//! Extender health and readiness

use anyhow::Result;
use balance_lib::health::{ComponentStatus, HealthResponse, ReadinessResponse};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

#[derive(Serialize)]
struct HealthReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

fn status_name(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (bool, ReadinessResponse) = client.probe("readyz").await?;

    if format == OutputFormat::Json {
        print_json(&HealthReport { health, readiness });
        return Ok(());
    }

    println!("{}", "Extender Health".bold());
    println!("{}", "=".repeat(50));
    println!("Status:     {}", color_status(status_name(health.status)));
    let ready = if readiness.ready { "ready" } else { "not ready" };
    println!("Readiness:  {}", color_status(ready));
    if let Some(reason) = &readiness.reason {
        print_warning(reason);
    }
    println!();

    let mut components: Vec<_> = health.components.into_iter().collect();
    components.sort_by(|a, b| a.0.cmp(&b.0));

    let rows: Vec<ComponentRow> = components
        .into_iter()
        .map(|(name, component)| ComponentRow {
            name,
            status: color_status(status_name(component.status)),
            message: component.message.unwrap_or_else(|| "-".to_string()),
            last_check: format_timestamp(component.last_check_timestamp),
        })
        .collect();

    print_rows(rows, &(), OutputFormat::Table);
    Ok(())
}

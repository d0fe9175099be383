//! Balance extender - workload balance scoring for the Kubernetes scheduler
//!
//! This binary runs next to the scheduler and ranks feasible nodes for each
//! pod through the extender prioritize endpoint.

use anyhow::Result;
use balance_extender::{api, config::ExtenderConfig};
use balance_lib::{
    health::{components, ComponentHealth, HealthRegistry},
    inventory::{CapacitySource, KubeInventory},
    observability::StructuredLogger,
    plugin::{WorkloadBalance, PLUGIN_NAME},
    telemetry::{CachedTelemetry, PrometheusTelemetry, TelemetrySource},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXTENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting balance-extender");

    let config = ExtenderConfig::load()?;
    info!(
        api_port = config.api_port,
        telemetry_fallback = config.engine.telemetry_fallback.as_str(),
        "Extender configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::INVENTORY).await;
    health_registry.register(components::ENGINE).await;

    let logger = StructuredLogger::new(PLUGIN_NAME);

    let inventory = Arc::new(KubeInventory::try_default(config.engine.capacity.clone()).await?);
    let capacities: Arc<dyn CapacitySource> = inventory.clone();

    let prometheus: Arc<dyn TelemetrySource> =
        Arc::new(PrometheusTelemetry::new(&config.engine.telemetry, capacities)?);
    let telemetry: Arc<dyn TelemetrySource> = if config.engine.telemetry.cache_ttl_ms > 0 {
        Arc::new(CachedTelemetry::new(
            prometheus,
            config.engine.telemetry.cache_ttl(),
            config.engine.telemetry.cache_max_entries,
        ))
    } else {
        prometheus
    };

    let plugin = WorkloadBalance::new(config.engine.clone(), telemetry, inventory)?
        .with_max_cohort_members(config.max_cohort_members);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::new(plugin),
        config.cycle_timeout(),
    ));

    logger.log_startup(EXTENDER_VERSION, &config.engine.telemetry.address);
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            // Stop taking cycles while the process drains
            health_registry.set_ready(false).await;
            health_registry
                .update(components::ENGINE, ComponentHealth::unhealthy("shutting down"))
                .await;
        }
    }

    info!("Shutting down");
    Ok(())
}

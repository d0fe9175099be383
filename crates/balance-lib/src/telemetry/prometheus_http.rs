//! Prometheus HTTP API telemetry source
//!
//! Host series come from node-exporter, instance series from cAdvisor.
//! Every dimension is one instant query; the four queries of a fetch run
//! concurrently.

use super::response::parse_instant_value;
use super::{async_trait, TelemetrySource};
use crate::config::TelemetryConfig;
use crate::error::{Result, ScoringError};
use crate::inventory::CapacitySource;
use crate::models::{Dimension, HostUsage, HostUtilization, InstanceUtilization, BYTES_PER_MIB};
use crate::observability::EngineMetrics;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use url::Url;

/// PromQL expressions for the tracked dimensions
#[derive(Debug, Clone)]
pub struct QueryTemplates {
    window: String,
}

impl QueryTemplates {
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
        }
    }

    /// Query for one host dimension; CPU in cores, others in bytes or bytes/s
    pub fn host(&self, host: &str, dimension: Dimension) -> String {
        let sel = format!(r#"instance=~"{}(:[0-9]+)?""#, escape_label(host));
        let w = &self.window;
        match dimension {
            Dimension::Cpu => format!(
                r#"sum(rate(node_cpu_seconds_total{{{sel},mode!="idle"}}[{w}]))"#
            ),
            Dimension::Memory => format!(
                "sum(node_memory_MemTotal_bytes{{{sel}}} - node_memory_MemAvailable_bytes{{{sel}}})"
            ),
            Dimension::IoStorage => format!(
                "sum(rate(node_disk_read_bytes_total{{{sel}}}[{w}])) + sum(rate(node_disk_written_bytes_total{{{sel}}}[{w}]))"
            ),
            Dimension::IoNetwork => format!(
                "sum(rate(node_network_receive_bytes_total{{{sel}}}[{w}])) + sum(rate(node_network_transmit_bytes_total{{{sel}}}[{w}]))"
            ),
        }
    }

    /// Query for one instance dimension; CPU in cores, others in bytes or bytes/s
    pub fn instance(&self, instance: &str, namespace: &str, dimension: Dimension) -> String {
        let sel = format!(
            r#"pod="{}",namespace="{}""#,
            escape_label(instance),
            escape_label(namespace)
        );
        let w = &self.window;
        match dimension {
            Dimension::Cpu => format!("sum(rate(container_cpu_usage_seconds_total{{{sel}}}[{w}]))"),
            Dimension::Memory => format!("sum(container_memory_usage_bytes{{{sel}}})"),
            Dimension::IoStorage => format!(
                "sum(rate(container_fs_reads_bytes_total{{{sel}}}[{w}])) + sum(rate(container_fs_writes_bytes_total{{{sel}}}[{w}]))"
            ),
            Dimension::IoNetwork => format!(
                "sum(rate(container_network_transmit_bytes_total{{{sel}}}[{w}])) + sum(rate(container_network_receive_bytes_total{{{sel}}}[{w}]))"
            ),
        }
    }
}

/// Escape a value for use inside a double-quoted PromQL label matcher
fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Instant query endpoint below `address`, keeping any route prefix
fn query_endpoint(address: &str) -> Result<Url> {
    let mut base = Url::parse(address).map_err(|e| {
        ScoringError::Config(format!("invalid telemetry address {}: {}", address, e))
    })?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join("api/v1/query")
        .map_err(|e| ScoringError::Config(format!("invalid telemetry address {}: {}", address, e)))
}

/// Convert a raw series value into the engine's unit for that dimension
fn to_engine_units(dimension: Dimension, raw: f64) -> f64 {
    match dimension {
        Dimension::Cpu => raw,
        Dimension::Memory | Dimension::IoStorage | Dimension::IoNetwork => raw / BYTES_PER_MIB,
    }
}

/// Telemetry source backed by the Prometheus HTTP API
pub struct PrometheusTelemetry {
    client: Client,
    query_url: Url,
    templates: QueryTemplates,
    capacities: Arc<dyn CapacitySource>,
    metrics: EngineMetrics,
}

impl PrometheusTelemetry {
    /// Create a new source; host capacities are resolved through `capacities`
    pub fn new(config: &TelemetryConfig, capacities: Arc<dyn CapacitySource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScoringError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            query_url: query_endpoint(&config.address)?,
            templates: QueryTemplates::new(config.promql_window()),
            capacities,
            metrics: EngineMetrics::new(),
        })
    }

    /// Run one instant query and convert the value into engine units
    async fn query(
        &self,
        target: &str,
        subject: &str,
        dimension: Dimension,
        expr: String,
    ) -> Result<f64> {
        let start = Instant::now();
        let result = self.query_inner(subject, dimension, &expr).await;
        self.metrics
            .observe_telemetry_latency(target, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            self.metrics.inc_telemetry_errors(e.kind());
            debug!(
                subject = %subject,
                dimension = %dimension,
                error = %e,
                "Telemetry query failed"
            );
        }

        result
    }

    async fn query_inner(&self, subject: &str, dimension: Dimension, expr: &str) -> Result<f64> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", expr)])
            .send()
            .await
            .map_err(|e| ScoringError::TelemetryUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ScoringError::TelemetryUnavailable(format!("failed to read response body: {}", e))
        })?;

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ScoringError::TelemetryUnavailable(format!(
                "backend responded with HTTP {}",
                status
            )));
        }

        // Prometheus reports query errors as JSON on 4xx responses; the parser surfaces them
        match parse_instant_value(&body) {
            Ok(Some(raw)) => Ok(to_engine_units(dimension, raw)),
            Ok(None) => Err(ScoringError::TelemetryEmptyResult {
                subject: subject.to_string(),
                dimension,
            }),
            Err(reason) => Err(ScoringError::TelemetryParseError(format!(
                "{} query for {}: {}",
                dimension, subject, reason
            ))),
        }
    }
}

#[async_trait]
impl TelemetrySource for PrometheusTelemetry {
    async fn fetch_host_utilization(&self, host: &str) -> Result<HostUtilization> {
        let dim = |d: Dimension| self.query("host", host, d, self.templates.host(host, d));

        let (cpu_used, mem_used, io_storage_used, io_network_used, capacity) = futures::try_join!(
            dim(Dimension::Cpu),
            dim(Dimension::Memory),
            dim(Dimension::IoStorage),
            dim(Dimension::IoNetwork),
            self.capacities.host_capacity(host),
        )?;

        let usage = HostUsage {
            cpu_used,
            mem_used,
            io_storage_used,
            io_network_used,
        };
        Ok(HostUtilization::new(usage, capacity))
    }

    async fn fetch_instance_utilization(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Result<InstanceUtilization> {
        let subject = format!("{}/{}", namespace, instance);
        let dim = |d: Dimension| {
            self.query("instance", &subject, d, self.templates.instance(instance, namespace, d))
        };

        let (cpu_usage, mem_usage, io_storage_usage, io_network_usage) = futures::try_join!(
            dim(Dimension::Cpu),
            dim(Dimension::Memory),
            dim(Dimension::IoStorage),
            dim(Dimension::IoNetwork),
        )?;

        Ok(InstanceUtilization {
            cpu_usage,
            mem_usage,
            io_storage_usage,
            io_network_usage,
        })
    }
}

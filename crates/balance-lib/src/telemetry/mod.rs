//! Utilization telemetry from the metrics backend
//!
//! This module provides the [`TelemetrySource`] abstraction used by the
//! scoring engine, a Prometheus HTTP implementation, and a TTL cache that
//! coalesces concurrent fetches for the same host or instance.

mod cache;
mod prometheus_http;
mod response;

pub use cache::CachedTelemetry;
pub use prometheus_http::{PrometheusTelemetry, QueryTemplates};
pub use response::parse_instant_value;

use crate::error::Result;
use crate::models::{HostUtilization, InstanceUtilization};

pub use async_trait::async_trait;

/// Source of point-in-time utilization for hosts and workload instances
///
/// A dimension with no data points must surface as
/// [`ScoringError::TelemetryEmptyResult`](crate::ScoringError::TelemetryEmptyResult),
/// never as zero usage.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch usage and capacity of a candidate host
    async fn fetch_host_utilization(&self, host: &str) -> Result<HostUtilization>;

    /// Fetch usage of one workload instance
    async fn fetch_instance_utilization(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Result<InstanceUtilization>;
}

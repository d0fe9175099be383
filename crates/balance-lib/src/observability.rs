//! Observability infrastructure for the scoring engine
//!
//! Provides:
//! - Prometheus metrics (telemetry latency, scoring latency, fallbacks, cache efficiency)
//! - Structured JSON logging with tracing

use crate::models::{CohortWorkload, HostScore, WeightVector};
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    telemetry_latency_seconds: HistogramVec,
    score_latency_seconds: Histogram,
    telemetry_errors: IntCounterVec,
    fallbacks: IntCounterVec,
    hosts_scored: IntCounter,
    hosts_excluded: IntCounter,
    cohort_defaults: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cycles_normalized: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            telemetry_latency_seconds: register_histogram_vec!(
                "workload_balance_telemetry_latency_seconds",
                "Time spent on a single telemetry backend query",
                &["target"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register telemetry_latency_seconds"),

            score_latency_seconds: register_histogram!(
                "workload_balance_score_latency_seconds",
                "Time spent scoring one candidate host",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register score_latency_seconds"),

            telemetry_errors: register_int_counter_vec!(
                "workload_balance_telemetry_errors_total",
                "Telemetry queries that failed, by error kind",
                &["kind"]
            )
            .expect("Failed to register telemetry_errors_total"),

            fallbacks: register_int_counter_vec!(
                "workload_balance_fallbacks_total",
                "Hosts scored through the telemetry fallback policy",
                &["policy"]
            )
            .expect("Failed to register fallbacks_total"),

            hosts_scored: register_int_counter!(
                "workload_balance_hosts_scored_total",
                "Total number of host scoring calls"
            )
            .expect("Failed to register hosts_scored_total"),

            hosts_excluded: register_int_counter!(
                "workload_balance_hosts_excluded_total",
                "Hosts excluded from ranking"
            )
            .expect("Failed to register hosts_excluded_total"),

            cohort_defaults: register_int_counter!(
                "workload_balance_cohort_defaults_total",
                "Placement decisions that fell back to the neutral cohort profile"
            )
            .expect("Failed to register cohort_defaults_total"),

            cache_hits: register_int_counter!(
                "workload_balance_telemetry_cache_hits_total",
                "Telemetry lookups answered from the cache"
            )
            .expect("Failed to register telemetry_cache_hits_total"),

            cache_misses: register_int_counter!(
                "workload_balance_telemetry_cache_misses_total",
                "Telemetry lookups that went to the backend"
            )
            .expect("Failed to register telemetry_cache_misses_total"),

            cycles_normalized: register_int_counter!(
                "workload_balance_cycles_normalized_total",
                "Scheduling cycles whose scores were normalized"
            )
            .expect("Failed to register cycles_normalized_total"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_telemetry_latency(&self, target: &str, duration_secs: f64) {
        self.inner()
            .telemetry_latency_seconds
            .with_label_values(&[target])
            .observe(duration_secs);
    }

    pub fn observe_score_latency(&self, duration_secs: f64) {
        self.inner().score_latency_seconds.observe(duration_secs);
    }

    pub fn inc_telemetry_errors(&self, kind: &str) {
        self.inner().telemetry_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_fallbacks(&self, policy: &str) {
        self.inner().fallbacks.with_label_values(&[policy]).inc();
    }

    pub fn inc_hosts_scored(&self) {
        self.inner().hosts_scored.inc();
    }

    pub fn inc_hosts_excluded(&self) {
        self.inner().hosts_excluded.inc();
    }

    pub fn inc_cohort_defaults(&self) {
        self.inner().cohort_defaults.inc();
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_cache_misses(&self) {
        self.inner().cache_misses.inc();
    }

    pub fn inc_cycles_normalized(&self) {
        self.inner().cycles_normalized.inc();
    }
}

/// Structured logger for scoring events
///
/// Every record carries the plugin name and an `event` tag so recoveries
/// can be traced back to the originating host or instance.
#[derive(Clone)]
pub struct StructuredLogger {
    plugin: String,
}

impl StructuredLogger {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    /// Log a successfully scored host
    pub fn log_host_scored(
        &self,
        instance: &str,
        host: &str,
        raw_score: f64,
        weights: &WeightVector,
        cohort: &CohortWorkload,
    ) {
        info!(
            event = "host_scored",
            plugin = %self.plugin,
            instance = %instance,
            host = %host,
            raw_score = raw_score,
            alpha = weights.alpha,
            beta = weights.beta,
            gamma = weights.gamma,
            delta = weights.delta,
            cohort_cpu = cohort.cpu_fraction,
            cohort_mem = cohort.mem_fraction,
            cohort_io_storage = cohort.io_storage_fraction,
            cohort_io_network = cohort.io_network_fraction,
            "Host scored"
        );
    }

    /// Log a host scored through the telemetry fallback policy
    pub fn log_telemetry_fallback(&self, instance: &str, host: &str, policy: &str, error: &str) {
        warn!(
            event = "telemetry_fallback",
            plugin = %self.plugin,
            instance = %instance,
            host = %host,
            policy = %policy,
            error = %error,
            "Telemetry unavailable, applying fallback"
        );
    }

    /// Log a host excluded from ranking
    pub fn log_host_excluded(&self, instance: &str, host: &str, reason: &str) {
        warn!(
            event = "host_excluded",
            plugin = %self.plugin,
            instance = %instance,
            host = %host,
            reason = %reason,
            "Host excluded from ranking"
        );
    }

    /// Log a fallback to the neutral cohort profile
    pub fn log_cohort_default(&self, instance: &str, namespace: &str, reason: &str) {
        info!(
            event = "cohort_default",
            plugin = %self.plugin,
            instance = %instance,
            namespace = %namespace,
            reason = %reason,
            "Using neutral cohort profile"
        );
    }

    /// Log the final scores of a cycle
    pub fn log_cycle_normalized(&self, instance: &str, scores: &[HostScore]) {
        let summary = scores
            .iter()
            .map(|s| format!("{}={}", s.host, s.score))
            .collect::<Vec<_>>()
            .join(",");

        info!(
            event = "cycle_normalized",
            plugin = %self.plugin,
            instance = %instance,
            hosts = scores.len(),
            scores = %summary,
            "Nodes final score"
        );
    }

    /// Log a cycle-level failure
    pub fn log_cycle_failed(&self, instance: &str, error: &str) {
        warn!(
            event = "cycle_failed",
            plugin = %self.plugin,
            instance = %instance,
            error = %error,
            "Score normalization failed"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, telemetry_address: &str) {
        info!(
            event = "extender_started",
            plugin = %self.plugin,
            version = %version,
            telemetry_address = %telemetry_address,
            "Scheduler extender started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "extender_shutdown",
            plugin = %self.plugin,
            reason = %reason,
            "Scheduler extender shutting down"
        );
    }
}

//! Engine configuration
//!
//! Every field has a serde default so a partial file or environment overlay
//! is enough to run the engine.

use crate::error::{Result, ScoringError};
use crate::models::WeightVector;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a host whose telemetry could not be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Score the host with a neutral raw score of 0.5
    #[default]
    Neutral,
    /// Exclude the host from normalization and give it score 0
    Exclude,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::Neutral => "neutral",
            FallbackPolicy::Exclude => "exclude",
        }
    }
}

/// Raw score assigned under [`FallbackPolicy::Neutral`]
pub const NEUTRAL_RAW_SCORE: f64 = 0.5;

/// Telemetry backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus base address
    #[serde(default = "default_address")]
    pub address: String,

    /// Averaging window for rate queries, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on a single query when the cycle has no tighter deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// TTL of the shared telemetry cache; 0 disables caching
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum number of cached entries
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_address() -> String {
    "http://prometheus:9090".to_string()
}

fn default_window_secs() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

fn default_cache_max_entries() -> usize {
    4_096
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            window_secs: default_window_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl TelemetryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// PromQL range selector for the averaging window, e.g. `5m`
    pub fn promql_window(&self) -> String {
        if self.window_secs % 60 == 0 {
            format!("{}m", self.window_secs / 60)
        } else {
            format!("{}s", self.window_secs)
        }
    }
}

/// Threshold rule used to derive dynamic weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightPolicy {
    #[serde(default)]
    pub base: WeightVector,

    /// A cohort fraction strictly above this triggers the bump
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Added to the weight of a hot dimension
    #[serde(default = "default_bump")]
    pub bump: f64,

    /// Removed from the paired weight when CPU or memory is hot
    #[serde(default = "default_compensation")]
    pub compensation: f64,

    /// Upper clamp for every weight
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

fn default_threshold() -> f64 {
    0.7
}

fn default_bump() -> f64 {
    0.1
}

fn default_compensation() -> f64 {
    0.05
}

fn default_max_weight() -> f64 {
    1.0
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            base: WeightVector::default(),
            threshold: default_threshold(),
            bump: default_bump(),
            compensation: default_compensation(),
            max_weight: default_max_weight(),
        }
    }
}

/// Per-dimension ceilings used to turn cohort usage into fractions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceCeilings {
    /// Cores
    #[serde(default = "default_cpu_ceiling")]
    pub cpu: f64,
    /// MiB
    #[serde(default = "default_mem_ceiling")]
    pub mem: f64,
    /// MiB/s
    #[serde(default = "default_io_storage_ceiling")]
    pub io_storage: f64,
    /// MiB/s
    #[serde(default = "default_io_network_ceiling")]
    pub io_network: f64,
}

fn default_cpu_ceiling() -> f64 {
    1.0
}

fn default_mem_ceiling() -> f64 {
    1024.0
}

fn default_io_storage_ceiling() -> f64 {
    50.0
}

fn default_io_network_ceiling() -> f64 {
    12.5
}

impl Default for ReferenceCeilings {
    fn default() -> Self {
        Self {
            cpu: default_cpu_ceiling(),
            mem: default_mem_ceiling(),
            io_storage: default_io_storage_ceiling(),
            io_network: default_io_network_ceiling(),
        }
    }
}

/// I/O capacities assumed for hosts, since inventory only reports CPU and memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityDefaults {
    /// MiB/s
    #[serde(default = "default_io_storage_capacity")]
    pub io_storage: f64,
    /// MiB/s (1 Gbps link)
    #[serde(default = "default_io_network_capacity")]
    pub io_network: f64,
}

fn default_io_storage_capacity() -> f64 {
    500.0
}

fn default_io_network_capacity() -> f64 {
    125.0
}

impl Default for CapacityDefaults {
    fn default() -> Self {
        Self {
            io_storage: default_io_storage_capacity(),
            io_network: default_io_network_capacity(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub weights: WeightPolicy,

    #[serde(default)]
    pub ceilings: ReferenceCeilings,

    #[serde(default)]
    pub capacity: CapacityDefaults,

    #[serde(default)]
    pub telemetry_fallback: FallbackPolicy,

    /// Upper bound of normalized scores
    #[serde(default = "default_max_score")]
    pub max_score: i64,
}

fn default_max_score() -> i64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            weights: WeightPolicy::default(),
            ceilings: ReferenceCeilings::default(),
            capacity: CapacityDefaults::default(),
            telemetry_fallback: FallbackPolicy::default(),
            max_score: default_max_score(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the scoring pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ceilings.cpu", self.ceilings.cpu),
            ("ceilings.mem", self.ceilings.mem),
            ("ceilings.io_storage", self.ceilings.io_storage),
            ("ceilings.io_network", self.ceilings.io_network),
            ("capacity.io_storage", self.capacity.io_storage),
            ("capacity.io_network", self.capacity.io_network),
            ("weights.max_weight", self.weights.max_weight),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ScoringError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let base = &self.weights.base;
        if [base.alpha, base.beta, base.gamma, base.delta]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(ScoringError::Config(
                "base weights must be non-negative".to_string(),
            ));
        }
        if base.sum() <= 0.0 {
            return Err(ScoringError::Config(
                "base weights must not all be zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.weights.threshold) {
            return Err(ScoringError::Config(format!(
                "weights.threshold must be within [0, 1], got {}",
                self.weights.threshold
            )));
        }

        let adjustments = [
            ("weights.bump", self.weights.bump),
            ("weights.compensation", self.weights.compensation),
        ];
        for (name, value) in adjustments {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ScoringError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.max_score <= 0 {
            return Err(ScoringError::Config(format!(
                "max_score must be positive, got {}",
                self.max_score
            )));
        }

        if self.telemetry.window_secs == 0 {
            return Err(ScoringError::Config(
                "telemetry.window_secs must be positive".to_string(),
            ));
        }

        url::Url::parse(&self.telemetry.address).map_err(|e| {
            ScoringError::Config(format!(
                "invalid telemetry address {}: {}",
                self.telemetry.address, e
            ))
        })?;

        Ok(())
    }
}

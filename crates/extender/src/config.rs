//! Extender configuration

use anyhow::Result;
use balance_lib::config::EngineConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "BALANCE_CONFIG";

/// Extender configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtenderConfig {
    /// Port serving the extender, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Deadline of a scheduling cycle when the request carries none
    #[serde(default = "default_cycle_timeout_ms")]
    pub cycle_timeout_ms: u64,

    /// Cohort members sampled per placement decision
    #[serde(default = "default_max_cohort_members")]
    pub max_cohort_members: usize,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_api_port() -> u16 {
    8888
}

fn default_cycle_timeout_ms() -> u64 {
    3000
}

fn default_max_cohort_members() -> usize {
    balance_lib::scoring::DEFAULT_MAX_MEMBERS
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cycle_timeout_ms: default_cycle_timeout_ms(),
            max_cohort_members: default_max_cohort_members(),
            engine: EngineConfig::default(),
        }
    }
}

impl ExtenderConfig {
    /// Load configuration from the optional file and `BALANCE_*` variables
    ///
    /// Nested keys use `__`, e.g. `BALANCE_ENGINE__TELEMETRY_FALLBACK=exclude`.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }
        builder = builder.add_source(
            Environment::with_prefix("BALANCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_timeout_ms == 0 {
            anyhow::bail!("cycle_timeout_ms must be positive");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_lib::config::FallbackPolicy;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<ExtenderConfig> {
        ExtenderConfig::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.api_port, 8888);
        assert_eq!(config.cycle_timeout(), Duration::from_secs(3));
        assert_eq!(config.engine.max_score, 100);
        assert_eq!(config.engine.telemetry_fallback, FallbackPolicy::Neutral);
    }

    #[test]
    fn test_nested_engine_settings() {
        let config = parse(
            r#"
            api_port = 9000

            [engine]
            telemetry_fallback = "exclude"

            [engine.telemetry]
            address = "http://prom.monitoring:9090"
            window_secs = 120

            [engine.weights]
            threshold = 0.8
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.engine.telemetry_fallback, FallbackPolicy::Exclude);
        assert_eq!(config.engine.telemetry.address, "http://prom.monitoring:9090");
        assert_eq!(config.engine.telemetry.promql_window(), "2m");
        assert_eq!(config.engine.weights.threshold, 0.8);
        assert_eq!(config.engine.weights.base.alpha, 0.4);
    }

    #[test]
    fn test_invalid_engine_settings_rejected() {
        assert!(parse("[engine]\nmax_score = 0").is_err());
        assert!(parse("cycle_timeout_ms = 0").is_err());
    }
}

//! Error taxonomy for the scoring pipeline

use crate::models::Dimension;
use thiserror::Error;

/// Errors produced while scoring candidate hosts
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    /// Transport failure, timeout or cycle cancellation
    #[error("telemetry backend unavailable: {0}")]
    TelemetryUnavailable(String),

    /// Malformed backend payload or value of the wrong type
    #[error("malformed telemetry response: {0}")]
    TelemetryParseError(String),

    /// The backend returned zero data points for a dimension
    #[error("no telemetry data for {dimension} of {subject}")]
    TelemetryEmptyResult { subject: String, dimension: Dimension },

    /// No cohort member yielded a usable sample
    #[error("no cohort data: {0}")]
    NoCohortData(String),

    #[error("invalid {dimension} capacity {value} on host {host}")]
    InvalidCapacity {
        host: String,
        dimension: Dimension,
        value: f64,
    },

    #[error("invalid weight vector: {0}")]
    InvalidWeights(String),

    #[error("invalid raw score {score} for host {host}")]
    InvalidRawScore { host: String, score: f64 },

    /// Normalization was requested over zero candidates
    #[error("empty candidate set")]
    EmptyCandidateSet,

    #[error("inventory lookup failed: {0}")]
    Inventory(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScoringError {
    /// True for failures of the telemetry backend, which the fallback policy covers
    pub fn is_telemetry(&self) -> bool {
        matches!(
            self,
            ScoringError::TelemetryUnavailable(_)
                | ScoringError::TelemetryParseError(_)
                | ScoringError::TelemetryEmptyResult { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::TelemetryUnavailable(_) => "unavailable",
            ScoringError::TelemetryParseError(_) => "parse_error",
            ScoringError::TelemetryEmptyResult { .. } => "empty_result",
            ScoringError::NoCohortData(_) => "no_cohort_data",
            ScoringError::InvalidCapacity { .. } => "invalid_capacity",
            ScoringError::InvalidWeights(_) => "invalid_weights",
            ScoringError::InvalidRawScore { .. } => "invalid_raw_score",
            ScoringError::EmptyCandidateSet => "empty_candidate_set",
            ScoringError::Inventory(_) => "inventory",
            ScoringError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;

//! Scoring pipeline
//!
//! Cohort aggregation, weight derivation, raw score calculation and
//! cross-host normalization. Everything except the cohort aggregator is a
//! pure function.

mod calculator;
mod cohort;
mod normalizer;
mod weights;

pub use calculator::compute_raw_score;
pub use cohort::{average_samples, select_group, CohortAggregator, DEFAULT_MAX_MEMBERS};
pub use normalizer::normalize_scores;
pub use weights::derive_weights;

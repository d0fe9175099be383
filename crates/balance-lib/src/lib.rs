//! Workload balance scoring library
//!
//! This crate provides the core functionality for:
//! - Telemetry retrieval from a Prometheus-compatible backend, with caching
//! - Cohort discovery through the cluster inventory
//! - Dynamic weight derivation and balance scoring of candidate hosts
//! - Cross-host score normalization behind a scheduler plugin interface
//! - Health checks and observability

pub mod config;
pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod plugin;
pub mod scoring;
pub mod telemetry;

pub use config::{EngineConfig, FallbackPolicy};
pub use error::{Result, ScoringError};
pub use health::{
    ComponentHealth, ComponentStatus, CycleReport, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use plugin::{prioritize, CycleState, ScorePlugin, Status, WorkloadBalance};

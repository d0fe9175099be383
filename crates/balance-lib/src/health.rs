//! Health tracking for the scheduler extender
//!
//! Component health is derived from scheduling cycle outcomes and served
//! through the liveness and readiness probes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Scoring still works, through fallbacks
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const TELEMETRY: &str = "telemetry";
    pub const INVENTORY: &str = "inventory";
    pub const ENGINE: &str = "engine";
}

/// Summary of one scheduling cycle, used to update component health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub hosts: usize,
    pub telemetry_failures: usize,
    pub excluded: usize,
    pub cohort_defaulted: bool,
}

#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Fold a cycle outcome into telemetry and engine health
    ///
    /// Telemetry is degraded when any host needed the fallback, including a
    /// full outage. Cycles still produce scores without telemetry, so a
    /// backend outage never makes the extender unhealthy or unready.
    pub async fn record_cycle(&self, report: &CycleReport) {
        let telemetry = if report.hosts > 0 && report.telemetry_failures == report.hosts {
            ComponentHealth::degraded(format!(
                "telemetry failed for all {} candidate hosts",
                report.hosts
            ))
        } else if report.telemetry_failures > 0 {
            ComponentHealth::degraded(format!(
                "telemetry failed for {} of {} candidate hosts",
                report.telemetry_failures, report.hosts
            ))
        } else {
            ComponentHealth::healthy()
        };
        self.update(components::TELEMETRY, telemetry).await;

        let engine = if report.excluded > 0 {
            ComponentHealth::degraded(format!(
                "{} of {} candidate hosts excluded",
                report.excluded, report.hosts
            ))
        } else {
            ComponentHealth::healthy()
        };
        self.update(components::ENGINE, engine).await;
    }

    /// Record the outcome of a cohort lookup against the inventory
    pub async fn record_inventory(&self, error: Option<&str>) {
        let health = match error {
            Some(message) => ComponentHealth::degraded(message),
            None => ComponentHealth::healthy(),
        };
        self.update(components::INVENTORY, health).await;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once initialized, as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Extender not yet initialized".to_string()),
            };
        }

        let health = self.health().await;
        if !health.status.is_operational() {
            let unhealthy: Vec<_> = health
                .components
                .iter()
                .filter(|(_, h)| h.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| name.as_str())
                .collect();
            return ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", unhealthy.join(", "))),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_partial_telemetry_failure_degrades() {
        let registry = HealthRegistry::new();
        registry.register(components::TELEMETRY).await;

        registry
            .record_cycle(&CycleReport {
                hosts: 4,
                telemetry_failures: 1,
                excluded: 0,
                cohort_defaulted: false,
            })
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::TELEMETRY].message.as_deref(),
            Some("telemetry failed for 1 of 4 candidate hosts")
        );
    }

    #[tokio::test]
    async fn test_total_telemetry_failure_degrades_but_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        registry
            .record_cycle(&CycleReport {
                hosts: 3,
                telemetry_failures: 3,
                excluded: 3,
                cohort_defaulted: true,
            })
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::TELEMETRY].message.as_deref(),
            Some("telemetry failed for all 3 candidate hosts")
        );
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .update(components::ENGINE, ComponentHealth::unhealthy("engine stopped"))
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains(components::ENGINE));
    }

    #[tokio::test]
    async fn test_clean_cycle_restores_health() {
        let registry = HealthRegistry::new();
        registry
            .record_cycle(&CycleReport {
                hosts: 2,
                telemetry_failures: 2,
                ..CycleReport::default()
            })
            .await;
        registry
            .record_cycle(&CycleReport {
                hosts: 2,
                ..CycleReport::default()
            })
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_inventory_errors_degrade() {
        let registry = HealthRegistry::new();
        registry.record_inventory(Some("failed to list services")).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.record_inventory(None).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_ready_when_set() {
        let registry = HealthRegistry::new();
        registry.register(components::ENGINE).await;
        registry.set_ready(true).await;

        assert!(registry.readiness().await.ready);
    }
}

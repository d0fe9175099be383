//! Workload balance scoring plugin

use super::cycle::{CohortResolution, CycleState, HostOutcome};
use super::{ScorePlugin, Status};
use crate::config::{EngineConfig, FallbackPolicy, NEUTRAL_RAW_SCORE};
use crate::error::{Result, ScoringError};
use crate::inventory::Inventory;
use crate::models::{CohortWorkload, HostScore, WorkloadInstance};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::scoring::{compute_raw_score, derive_weights, normalize_scores, CohortAggregator};
use crate::telemetry::TelemetrySource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Name the plugin registers under
pub const PLUGIN_NAME: &str = "workloadbalance";

/// Ranks candidate hosts by how much balanced headroom they leave, with
/// dimension weights shifted toward what the instance's cohort consumes
pub struct WorkloadBalance {
    telemetry: Arc<dyn TelemetrySource>,
    cohorts: CohortAggregator,
    config: EngineConfig,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl WorkloadBalance {
    pub fn new(
        config: EngineConfig,
        telemetry: Arc<dyn TelemetrySource>,
        inventory: Arc<dyn Inventory>,
    ) -> Result<Self> {
        config.validate()?;

        let cohorts = CohortAggregator::new(inventory, telemetry.clone(), config.ceilings.clone());

        Ok(Self {
            telemetry,
            cohorts,
            config,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new(PLUGIN_NAME),
        })
    }

    /// Limit the cohort members sampled per placement decision
    pub fn with_max_cohort_members(mut self, max_members: usize) -> Self {
        self.cohorts = self.cohorts.with_max_members(max_members);
        self
    }

    fn provisional_score(&self, raw: f64) -> i64 {
        (raw * self.config.max_score as f64).round() as i64
    }

    /// Cohort profile of the cycle, resolved on first use
    async fn cohort_workload(
        &self,
        cycle: &CycleState,
        instance: &WorkloadInstance,
    ) -> CohortWorkload {
        let resolution = cycle
            .cohort_or_init(async {
                match cycle.bounded(self.cohorts.cohort_workload(instance)).await {
                    Ok(workload) => CohortResolution {
                        workload,
                        defaulted: None,
                    },
                    Err(e) => {
                        self.metrics.inc_cohort_defaults();
                        self.logger.log_cohort_default(
                            &instance.name,
                            &instance.namespace,
                            &e.to_string(),
                        );
                        CohortResolution {
                            workload: CohortWorkload::NEUTRAL,
                            defaulted: Some(e),
                        }
                    }
                }
            })
            .await;

        resolution.workload
    }

    fn exclude(
        &self,
        cycle: &CycleState,
        instance: &str,
        host: &str,
        telemetry: bool,
        error: &ScoringError,
    ) -> (i64, Status) {
        self.metrics.inc_hosts_excluded();
        self.logger.log_host_excluded(instance, host, &error.to_string());
        cycle.record(host, HostOutcome::Excluded { telemetry });
        (0, Status::Excluded(error.to_string()))
    }

    /// Apply the configured policy to a host whose telemetry failed
    fn telemetry_fallback(
        &self,
        cycle: &CycleState,
        instance: &str,
        host: &str,
        error: &ScoringError,
    ) -> (i64, Status) {
        let policy = self.config.telemetry_fallback;
        self.metrics.inc_fallbacks(policy.as_str());
        self.logger
            .log_telemetry_fallback(instance, host, policy.as_str(), &error.to_string());

        match policy {
            FallbackPolicy::Neutral => {
                cycle.record(host, HostOutcome::Fallback(NEUTRAL_RAW_SCORE));
                (
                    self.provisional_score(NEUTRAL_RAW_SCORE),
                    Status::Degraded(format!("neutral score used: {}", error)),
                )
            }
            FallbackPolicy::Exclude => self.exclude(cycle, instance, host, true, error),
        }
    }
}

#[async_trait]
impl ScorePlugin for WorkloadBalance {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    /// Returns the provisional score `round(raw * max_score)`; the final
    /// ranking comes from `normalize_score`
    async fn score(
        &self,
        cycle: &CycleState,
        instance: &WorkloadInstance,
        host: &str,
    ) -> (i64, Status) {
        let started = Instant::now();
        self.metrics.inc_hosts_scored();
        let subject = instance.reference().to_string();

        let (cohort, utilization) = tokio::join!(
            self.cohort_workload(cycle, instance),
            cycle.bounded(self.telemetry.fetch_host_utilization(host)),
        );
        let weights = derive_weights(&cohort, &self.config.weights);

        let result = match utilization {
            Ok(utilization) => match compute_raw_score(host, &utilization, &weights) {
                Ok(raw) => {
                    cycle.record(host, HostOutcome::Scored(raw));
                    self.logger.log_host_scored(&subject, host, raw, &weights, &cohort);
                    (self.provisional_score(raw), Status::Success)
                }
                Err(e) => self.exclude(cycle, &subject, host, false, &e),
            },
            Err(e) if e.is_telemetry() => self.telemetry_fallback(cycle, &subject, host, &e),
            Err(e) => self.exclude(cycle, &subject, host, false, &e),
        };

        self.metrics.observe_score_latency(started.elapsed().as_secs_f64());
        result
    }

    /// Min-max normalize the raw scores recorded this cycle
    ///
    /// Excluded hosts end at 0 and take no part in the min/max. Hosts this
    /// plugin never scored keep their incoming score as a raw value.
    async fn normalize_score(
        &self,
        cycle: &CycleState,
        instance: &WorkloadInstance,
        scores: &mut [HostScore],
    ) -> Status {
        let subject = instance.reference().to_string();
        let max_score = self.config.max_score;

        if scores.is_empty() {
            let error = ScoringError::EmptyCandidateSet;
            self.logger.log_cycle_failed(&subject, &error.to_string());
            return Status::Error(error.to_string());
        }

        let mut raw_scores = HashMap::with_capacity(scores.len());
        for entry in scores.iter() {
            let raw = match cycle.outcome(&entry.host) {
                Some(outcome) => outcome.raw_score(),
                None => Some(entry.score as f64 / max_score as f64),
            };
            if let Some(raw) = raw {
                raw_scores.insert(entry.host.clone(), raw);
            }
        }

        if raw_scores.is_empty() {
            for entry in scores.iter_mut() {
                entry.score = 0;
            }
            self.logger.log_cycle_normalized(&subject, scores);
            return Status::Degraded("every candidate host was excluded".to_string());
        }

        match normalize_scores(&raw_scores, max_score) {
            Ok(normalized) => {
                for entry in scores.iter_mut() {
                    entry.score = normalized.get(&entry.host).copied().unwrap_or(0);
                }
                self.metrics.inc_cycles_normalized();
                self.logger.log_cycle_normalized(&subject, scores);
                Status::Success
            }
            Err(e) => {
                self.logger.log_cycle_failed(&subject, &e.to_string());
                Status::Error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StaticInventory;
    use crate::models::{HostUtilization, InstanceUtilization, WorkloadGroup};
    use crate::plugin::prioritize;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockTelemetry {
        hosts: HashMap<String, HostUtilization>,
        instances: HashMap<String, InstanceUtilization>,
        hanging: HashSet<String>,
        instance_calls: AtomicUsize,
    }

    impl MockTelemetry {
        fn host(mut self, name: &str, utilization: HostUtilization) -> Self {
            self.hosts.insert(name.to_string(), utilization);
            self
        }

        fn hanging_host(mut self, name: &str) -> Self {
            self.hanging.insert(name.to_string());
            self
        }

        fn instance(mut self, name: &str, sample: InstanceUtilization) -> Self {
            self.instances.insert(name.to_string(), sample);
            self
        }
    }

    #[async_trait]
    impl TelemetrySource for MockTelemetry {
        async fn fetch_host_utilization(&self, host: &str) -> Result<HostUtilization> {
            if self.hanging.contains(host) {
                std::future::pending::<()>().await;
            }
            self.hosts
                .get(host)
                .copied()
                .ok_or_else(|| ScoringError::TelemetryUnavailable(format!("no data for {}", host)))
        }

        async fn fetch_instance_utilization(
            &self,
            instance: &str,
            _namespace: &str,
        ) -> Result<InstanceUtilization> {
            self.instance_calls.fetch_add(1, Ordering::SeqCst);
            self.instances
                .get(instance)
                .copied()
                .ok_or_else(|| ScoringError::TelemetryUnavailable(instance.to_string()))
        }
    }

    /// Host with the given CPU usage out of 100 and idle elsewhere
    fn host_with_cpu(cpu_used: f64, mem_used: f64) -> HostUtilization {
        HostUtilization {
            cpu_used,
            mem_used,
            io_storage_used: 0.0,
            io_network_used: 0.0,
            cpu_capacity: 100.0,
            mem_capacity: 100.0,
            io_storage_capacity: 100.0,
            io_network_capacity: 100.0,
        }
    }

    fn engine(telemetry: MockTelemetry, inventory: StaticInventory) -> WorkloadBalance {
        WorkloadBalance::new(
            EngineConfig::default(),
            Arc::new(telemetry),
            Arc::new(inventory),
        )
        .unwrap()
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    fn instance() -> WorkloadInstance {
        WorkloadInstance::new("web-new", "shop").with_label("app", "web")
    }

    fn web_group() -> WorkloadGroup {
        WorkloadGroup {
            name: "web".to_string(),
            namespace: "shop".to_string(),
            selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
        }
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_score_future_is_send() {
        let plugin = engine(MockTelemetry::default(), StaticInventory::new());
        let cycle = CycleState::new(Duration::from_secs(1));
        let instance = instance();

        assert_send(plugin.score(&cycle, &instance, "node-a"));
        assert_send(plugin.cohort_workload(&cycle, &instance));
        assert_send(plugin.cohorts.cohort_workload(&instance));
    }

    #[tokio::test]
    async fn test_score_with_base_weights() {
        let plugin = engine(
            MockTelemetry::default().host("node-a", host_with_cpu(30.0, 0.0)),
            StaticInventory::new(),
        );
        let cycle = CycleState::new(Duration::from_secs(1));

        let (score, status) = plugin.score(&cycle, &instance(), "node-a").await;

        assert_eq!(status, Status::Success);
        assert_eq!(score, 88);
        match cycle.outcome("node-a") {
            Some(HostOutcome::Scored(raw)) => assert!((raw - 0.88).abs() < 1e-9),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_hosts_normalize_to_extremes() {
        let plugin = engine(
            MockTelemetry::default()
                .host("node-a", host_with_cpu(30.0, 0.0))
                .host("node-b", host_with_cpu(75.0, 100.0)),
            StaticInventory::new(),
        );
        let cycle = CycleState::new(Duration::from_secs(1));

        let scores = prioritize(&plugin, &cycle, &instance(), &hosts(&["node-a", "node-b"]))
            .await
            .unwrap();

        assert_eq!(scores[0], HostScore::new("node-a", 100));
        assert_eq!(scores[1], HostScore::new("node-b", 0));
    }

    #[tokio::test]
    async fn test_hot_cohort_shifts_weights() {
        let inventory = StaticInventory::new()
            .with_group(web_group())
            .with_instance(WorkloadInstance::new("web-0", "shop").with_label("app", "web"));
        let telemetry = MockTelemetry::default()
            .host("node-a", host_with_cpu(30.0, 0.0))
            .instance(
                "web-0",
                InstanceUtilization {
                    cpu_usage: 0.8,
                    mem_usage: 204.8,
                    io_storage_usage: 10.0,
                    io_network_usage: 2.5,
                },
            );
        let plugin = engine(telemetry, inventory);
        let cycle = CycleState::new(Duration::from_secs(1));

        let (score, status) = plugin.score(&cycle, &instance(), "node-a").await;

        assert_eq!(status, Status::Success);
        assert_eq!(score, 86);
        match cycle.outcome("node-a") {
            Some(HostOutcome::Scored(raw)) => assert!((raw - 0.9 / 1.05).abs() < 1e-9),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(cycle.cohort().unwrap().defaulted.is_none());
    }

    #[tokio::test]
    async fn test_telemetry_timeout_uses_neutral_fallback() {
        let plugin = engine(
            MockTelemetry::default()
                .host("node-a", host_with_cpu(30.0, 0.0))
                .hanging_host("node-x"),
            StaticInventory::new(),
        );
        let cycle = CycleState::new(Duration::from_millis(50));

        let (score, status) = plugin.score(&cycle, &instance(), "node-x").await;

        assert_eq!(score, 50);
        assert!(matches!(status, Status::Degraded(_)));
        assert!(!status.is_fatal());
        assert_eq!(cycle.outcome("node-x"), Some(HostOutcome::Fallback(0.5)));
    }

    #[tokio::test]
    async fn test_telemetry_timeout_with_exclude_policy() {
        let config = EngineConfig {
            telemetry_fallback: FallbackPolicy::Exclude,
            ..EngineConfig::default()
        };
        let telemetry = MockTelemetry::default()
            .host("node-a", host_with_cpu(30.0, 0.0))
            .host("node-b", host_with_cpu(75.0, 100.0))
            .hanging_host("node-x");
        let plugin = WorkloadBalance::new(
            config,
            Arc::new(telemetry),
            Arc::new(StaticInventory::new()),
        )
        .unwrap();
        let cycle = CycleState::new(Duration::from_millis(50));

        let scores = prioritize(
            &plugin,
            &cycle,
            &instance(),
            &hosts(&["node-a", "node-x", "node-b"]),
        )
        .await
        .unwrap();

        let values: Vec<_> = scores.iter().map(|s| s.score).collect();
        assert_eq!(values, vec![100, 0, 0]);
        assert_eq!(
            cycle.outcome("node-x"),
            Some(HostOutcome::Excluded { telemetry: true })
        );

        let report = cycle.report();
        assert_eq!(report.excluded, 1);
        assert_eq!(report.telemetry_failures, 1);
    }

    #[tokio::test]
    async fn test_no_group_defaults_to_neutral_cohort() {
        let inventory = StaticInventory::new().with_group(web_group());
        let plugin = engine(
            MockTelemetry::default().host("node-a", host_with_cpu(30.0, 0.0)),
            inventory,
        );
        let cycle = CycleState::new(Duration::from_secs(1));
        let batch = WorkloadInstance::new("job-1", "shop").with_label("app", "batch");

        let (score, status) = plugin.score(&cycle, &batch, "node-a").await;

        assert_eq!(status, Status::Success);
        assert_eq!(score, 88);
        let cohort = cycle.cohort().unwrap();
        assert_eq!(cohort.workload, CohortWorkload::NEUTRAL);
        assert!(matches!(cohort.defaulted, Some(ScoringError::NoCohortData(_))));
        assert!(cycle.report().cohort_defaulted);
    }

    #[tokio::test]
    async fn test_invalid_capacity_excludes_host_only() {
        let mut broken = host_with_cpu(10.0, 0.0);
        broken.cpu_capacity = 0.0;
        let plugin = engine(
            MockTelemetry::default()
                .host("node-a", host_with_cpu(30.0, 0.0))
                .host("node-b", host_with_cpu(60.0, 0.0))
                .host("node-c", broken),
            StaticInventory::new(),
        );
        let cycle = CycleState::new(Duration::from_secs(1));

        let (_, status) = plugin.score(&cycle, &instance(), "node-c").await;
        assert!(matches!(status, Status::Excluded(ref m) if m.contains("capacity")));

        let scores = prioritize(
            &plugin,
            &cycle,
            &instance(),
            &hosts(&["node-a", "node-b", "node-c"]),
        )
        .await
        .unwrap();

        let values: Vec<_> = scores.iter().map(|s| s.score).collect();
        assert_eq!(values, vec![100, 0, 0]);
    }

    #[tokio::test]
    async fn test_cohort_fetched_once_per_cycle() {
        let inventory = StaticInventory::new()
            .with_group(web_group())
            .with_instance(WorkloadInstance::new("web-0", "shop").with_label("app", "web"));
        let telemetry = Arc::new(
            MockTelemetry::default()
                .host("node-a", host_with_cpu(10.0, 0.0))
                .host("node-b", host_with_cpu(20.0, 0.0))
                .host("node-c", host_with_cpu(30.0, 0.0))
                .instance("web-0", InstanceUtilization::default()),
        );
        let plugin = WorkloadBalance::new(
            EngineConfig::default(),
            telemetry.clone(),
            Arc::new(inventory),
        )
        .unwrap();
        let cycle = CycleState::new(Duration::from_secs(1));

        prioritize(
            &plugin,
            &cycle,
            &instance(),
            &hosts(&["node-a", "node-b", "node-c"]),
        )
        .await
        .unwrap();

        assert_eq!(telemetry.instance_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_normalize_empty_candidate_set_fails_cycle() {
        let plugin = engine(MockTelemetry::default(), StaticInventory::new());
        let cycle = CycleState::new(Duration::from_secs(1));

        let status = plugin.normalize_score(&cycle, &instance(), &mut []).await;
        assert!(status.is_fatal());
    }

    #[tokio::test]
    async fn test_normalize_all_excluded_is_not_fatal() {
        let config = EngineConfig {
            telemetry_fallback: FallbackPolicy::Exclude,
            ..EngineConfig::default()
        };
        let plugin = WorkloadBalance::new(
            config,
            Arc::new(MockTelemetry::default()),
            Arc::new(StaticInventory::new()),
        )
        .unwrap();
        let cycle = CycleState::new(Duration::from_secs(1));

        let scores = prioritize(&plugin, &cycle, &instance(), &hosts(&["node-a", "node-b"]))
            .await
            .unwrap();

        assert!(scores.iter().all(|s| s.score == 0));
    }

    #[tokio::test]
    async fn test_normalize_uses_incoming_scores_for_unknown_hosts() {
        let plugin = engine(MockTelemetry::default(), StaticInventory::new());
        let cycle = CycleState::new(Duration::from_secs(1));
        let mut scores = vec![HostScore::new("node-a", 90), HostScore::new("node-b", 45)];

        let status = plugin.normalize_score(&cycle, &instance(), &mut scores).await;

        assert_eq!(status, Status::Success);
        assert_eq!(scores[0].score, 100);
        assert_eq!(scores[1].score, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.ceilings.cpu = 0.0;

        let result = WorkloadBalance::new(
            config,
            Arc::new(MockTelemetry::default()),
            Arc::new(StaticInventory::new()),
        );
        assert!(matches!(result, Err(ScoringError::Config(_))));
    }
}

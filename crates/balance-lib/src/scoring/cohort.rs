//! Cohort discovery and workload aggregation
//!
//! The cohort of a workload instance is the set of instances selected by the
//! grouping resource whose selector matches the instance labels. Their mean
//! utilization, relative to configured reference ceilings, drives the
//! dynamic weights.

use crate::config::ReferenceCeilings;
use crate::error::{Result, ScoringError};
use crate::inventory::Inventory;
use crate::models::{
    CohortWorkload, InstanceRef, InstanceUtilization, WorkloadGroup, WorkloadInstance,
};
use crate::telemetry::TelemetrySource;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Default cap on cohort members sampled per placement decision
pub const DEFAULT_MAX_MEMBERS: usize = 64;

/// Concurrent member fetches per aggregation
const MEMBER_FETCH_CONCURRENCY: usize = 16;

type MemberFetch = BoxFuture<'static, (InstanceRef, Result<InstanceUtilization>)>;

/// Pick the group governing `instance`: the lexicographically smallest name
/// among the groups whose selector matches the instance labels
pub fn select_group<'a>(
    groups: &'a [WorkloadGroup],
    instance: &WorkloadInstance,
) -> Option<&'a WorkloadGroup> {
    groups
        .iter()
        .filter(|g| g.namespace == instance.namespace && g.matches(&instance.labels))
        .min_by(|a, b| a.name.cmp(&b.name))
}

/// Average member samples into a cohort profile
///
/// Each mean is divided by its reference ceiling and clamped to [0, 1].
pub fn average_samples(
    samples: &[InstanceUtilization],
    ceilings: &ReferenceCeilings,
) -> Result<CohortWorkload> {
    if samples.is_empty() {
        return Err(ScoringError::NoCohortData(
            "no cohort member produced a sample".to_string(),
        ));
    }

    let n = samples.len() as f64;
    let mean = |f: fn(&InstanceUtilization) -> f64| samples.iter().map(f).sum::<f64>() / n;

    Ok(CohortWorkload::clamped(
        mean(|s| s.cpu_usage) / ceilings.cpu,
        mean(|s| s.mem_usage) / ceilings.mem,
        mean(|s| s.io_storage_usage) / ceilings.io_storage,
        mean(|s| s.io_network_usage) / ceilings.io_network,
    ))
}

/// Resolves cohorts through the inventory and aggregates their telemetry
pub struct CohortAggregator {
    inventory: Arc<dyn Inventory>,
    telemetry: Arc<dyn TelemetrySource>,
    ceilings: ReferenceCeilings,
    max_members: usize,
}

impl CohortAggregator {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        telemetry: Arc<dyn TelemetrySource>,
        ceilings: ReferenceCeilings,
    ) -> Self {
        Self {
            inventory,
            telemetry,
            ceilings,
            max_members: DEFAULT_MAX_MEMBERS,
        }
    }

    /// Limit the number of members sampled per aggregation
    pub fn with_max_members(mut self, max_members: usize) -> Self {
        self.max_members = max_members.max(1);
        self
    }

    /// Find the cohort of `instance`, sorted by name
    ///
    /// An instance matched by no group has an empty cohort.
    pub async fn resolve_cohort(&self, instance: &WorkloadInstance) -> Result<Vec<InstanceRef>> {
        let groups = self.inventory.list_groups(&instance.namespace).await?;

        let Some(group) = select_group(&groups, instance) else {
            debug!(
                instance = %instance.name,
                namespace = %instance.namespace,
                "No workload group matches instance"
            );
            return Ok(Vec::new());
        };

        let mut members = self
            .inventory
            .list_instances(&instance.namespace, &group.selector)
            .await?;
        members.sort();
        members.dedup();

        debug!(
            instance = %instance.name,
            namespace = %instance.namespace,
            group = %group.name,
            members = members.len(),
            "Resolved cohort"
        );

        Ok(members)
    }

    /// Fetch and average the utilization of cohort members
    ///
    /// Per-member failures are skipped; only a cohort with no usable sample
    /// fails, with [`ScoringError::NoCohortData`].
    pub async fn aggregate_cohort_workload(
        &self,
        cohort: &[InstanceRef],
    ) -> Result<CohortWorkload> {
        let sampled = &cohort[..cohort.len().min(self.max_members)];

        // Fetches own their inputs; a borrowing closure here makes the caller's future !Send
        let fetches: Vec<MemberFetch> = sampled
            .iter()
            .cloned()
            .map(|member| {
                let telemetry = Arc::clone(&self.telemetry);
                async move {
                    let result = telemetry
                        .fetch_instance_utilization(&member.name, &member.namespace)
                        .await;
                    (member, result)
                }
                .boxed()
            })
            .collect();

        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(MEMBER_FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut samples = Vec::with_capacity(results.len());
        for (member, result) in results {
            match result {
                Ok(sample) => samples.push(sample),
                Err(e) => debug!(member = %member, error = %e, "Skipping cohort member"),
            }
        }

        let workload = average_samples(&samples, &self.ceilings)?;
        info!(
            members = sampled.len(),
            sampled = samples.len(),
            cpu_fraction = workload.cpu_fraction,
            mem_fraction = workload.mem_fraction,
            io_storage_fraction = workload.io_storage_fraction,
            io_network_fraction = workload.io_network_fraction,
            "Aggregated cohort workload"
        );

        Ok(workload)
    }

    /// Resolve and aggregate in one step
    pub async fn cohort_workload(&self, instance: &WorkloadInstance) -> Result<CohortWorkload> {
        let cohort = self.resolve_cohort(instance).await?;
        if cohort.is_empty() {
            return Err(ScoringError::NoCohortData(format!(
                "instance {}/{} has no cohort",
                instance.namespace, instance.name
            )));
        }
        self.aggregate_cohort_workload(&cohort).await
    }
}

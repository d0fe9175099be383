//! Scheduler-framework boundary
//!
//! A scoring strategy implements [`ScorePlugin`]: one `score` call per
//! candidate host, then a single `normalize_score` pass over the whole
//! cycle. [`prioritize`] drives that sequence the way a host runtime would,
//! with all per-host calls finished before normalization starts.

mod cycle;
mod engine;

pub use cycle::{CohortResolution, CycleState, HostOutcome};
pub use engine::{WorkloadBalance, PLUGIN_NAME};

use crate::models::{HostScore, WorkloadInstance};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a plugin call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum Status {
    Success,
    /// Scored through a fallback; the cycle continues
    Degraded(String),
    /// Host left out of the ranking; the cycle continues
    Excluded(String),
    /// Cycle-level failure
    Error(String),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// Only `Error` aborts a cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Status::Success => None,
            Status::Degraded(m) | Status::Excluded(m) | Status::Error(m) => Some(m),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Degraded(m) => write!(f, "degraded: {}", m),
            Status::Excluded(m) => write!(f, "excluded: {}", m),
            Status::Error(m) => write!(f, "error: {}", m),
        }
    }
}

/// Scoring capability registered with a host scheduler runtime
#[async_trait]
pub trait ScorePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Score one candidate host; never fails the cycle
    async fn score(
        &self,
        cycle: &CycleState,
        instance: &WorkloadInstance,
        host: &str,
    ) -> (i64, Status);

    /// Rescale the scores of every candidate host in place
    async fn normalize_score(
        &self,
        cycle: &CycleState,
        instance: &WorkloadInstance,
        scores: &mut [HostScore],
    ) -> Status;
}

/// Score every host concurrently, then normalize once all calls are done
///
/// Returns the final scores in the order of `hosts`, or the status of a
/// failed normalization.
pub async fn prioritize(
    plugin: &dyn ScorePlugin,
    cycle: &CycleState,
    instance: &WorkloadInstance,
    hosts: &[String],
) -> std::result::Result<Vec<HostScore>, Status> {
    let results = futures::future::join_all(
        hosts
            .iter()
            .map(|host| async move { (host, plugin.score(cycle, instance, host).await) }),
    )
    .await;

    let mut scores: Vec<HostScore> = results
        .into_iter()
        .map(|(host, (score, _status))| HostScore::new(host.clone(), score))
        .collect();

    let status = plugin.normalize_score(cycle, instance, &mut scores).await;
    if status.is_fatal() {
        return Err(status);
    }

    Ok(scores)
}

//! Per-cycle scheduling state
//!
//! One [`CycleState`] exists per placement decision. It bounds every
//! telemetry call by the cycle deadline, propagates cancellation, memoizes
//! the cohort profile of the instance being placed and keeps the raw score
//! of each host until normalization.

use crate::error::{Result, ScoringError};
use crate::health::CycleReport;
use crate::models::CohortWorkload;
use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{watch, OnceCell};
use tokio::time::Instant;

/// Result of scoring one host, kept until normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostOutcome {
    /// Raw score computed from live telemetry
    Scored(f64),
    /// Neutral raw score assigned because telemetry failed
    Fallback(f64),
    /// Host left out of the ranking
    Excluded { telemetry: bool },
}

impl HostOutcome {
    /// Raw score taking part in normalization, if any
    pub fn raw_score(&self) -> Option<f64> {
        match self {
            HostOutcome::Scored(raw) | HostOutcome::Fallback(raw) => Some(*raw),
            HostOutcome::Excluded { .. } => None,
        }
    }
}

/// Cohort profile used for every host of the cycle
#[derive(Debug, Clone)]
pub struct CohortResolution {
    pub workload: CohortWorkload,
    /// Set when the neutral profile replaced the measured one
    pub defaulted: Option<ScoringError>,
}

pub struct CycleState {
    deadline: Instant,
    cancel: watch::Sender<bool>,
    cohort: OnceCell<CohortResolution>,
    outcomes: DashMap<String, HostOutcome>,
}

impl CycleState {
    /// Create the state of a cycle that must finish within `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            deadline,
            cancel,
            cohort: OnceCell::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Cancel the cycle; in-flight bounded calls return immediately
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run a telemetry call under the cycle deadline and cancellation
    ///
    /// Deadline expiry and cancellation both surface as
    /// [`ScoringError::TelemetryUnavailable`]; the call future is dropped.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(ScoringError::TelemetryUnavailable(
                "scheduling cycle cancelled".to_string(),
            ));
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ScoringError::TelemetryUnavailable(
                "scheduling cycle cancelled".to_string(),
            )),
            result = tokio::time::timeout_at(self.deadline, call) => match result {
                Ok(result) => result,
                Err(_) => Err(ScoringError::TelemetryUnavailable(
                    "scheduling cycle deadline exceeded".to_string(),
                )),
            },
        }
    }

    /// Resolve the cohort once per cycle; concurrent callers share the result
    pub async fn cohort_or_init<F>(&self, init: F) -> &CohortResolution
    where
        F: Future<Output = CohortResolution>,
    {
        self.cohort.get_or_init(|| init).await
    }

    pub fn cohort(&self) -> Option<&CohortResolution> {
        self.cohort.get()
    }

    pub fn record(&self, host: &str, outcome: HostOutcome) {
        self.outcomes.insert(host.to_string(), outcome);
    }

    pub fn outcome(&self, host: &str) -> Option<HostOutcome> {
        self.outcomes.get(host).map(|entry| *entry.value())
    }

    /// Summary of the host outcomes recorded so far
    pub fn report(&self) -> CycleReport {
        let mut report = CycleReport {
            hosts: self.outcomes.len(),
            cohort_defaulted: self
                .cohort
                .get()
                .map(|c| c.defaulted.is_some())
                .unwrap_or(false),
            ..CycleReport::default()
        };

        for entry in self.outcomes.iter() {
            match entry.value() {
                HostOutcome::Scored(_) => {}
                HostOutcome::Fallback(_) => report.telemetry_failures += 1,
                HostOutcome::Excluded { telemetry } => {
                    report.excluded += 1;
                    if *telemetry {
                        report.telemetry_failures += 1;
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let cycle = CycleState::new(Duration::from_secs(1));
        let value = cycle.bounded(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_bounded_times_out_at_deadline() {
        let cycle = CycleState::new(Duration::from_millis(20));
        let started = std::time::Instant::now();

        let err = cycle
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ScoringError::TelemetryUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_call() {
        let cycle = Arc::new(CycleState::new(Duration::from_secs(30)));

        let canceller = cycle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = cycle
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cancelled"));
        assert!(cycle.is_cancelled());

        // Later calls fail fast
        assert!(cycle.bounded(async { Ok(1) }).await.is_err());
    }

    #[tokio::test]
    async fn test_cohort_resolved_once() {
        let cycle = CycleState::new(Duration::from_secs(1));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let resolution = cycle
                .cohort_or_init(async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CohortResolution {
                        workload: CohortWorkload::NEUTRAL,
                        defaulted: None,
                    }
                })
                .await;
            assert_eq!(resolution.workload, CohortWorkload::NEUTRAL);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cohort_keeps_default_reason() {
        let cycle = CycleState::new(Duration::from_secs(1));
        assert!(cycle.cohort().is_none());

        cycle
            .cohort_or_init(async {
                CohortResolution {
                    workload: CohortWorkload::NEUTRAL,
                    defaulted: Some(ScoringError::NoCohortData("web".to_string())),
                }
            })
            .await;

        let cohort = cycle.cohort().unwrap();
        assert!(matches!(cohort.defaulted, Some(ScoringError::NoCohortData(_))));
        assert!(cycle.report().cohort_defaulted);
    }

    #[test]
    fn test_report_counts_outcomes() {
        let cycle = CycleState::new(Duration::from_secs(1));
        cycle.record("a", HostOutcome::Scored(0.8));
        cycle.record("b", HostOutcome::Fallback(0.5));
        cycle.record("c", HostOutcome::Excluded { telemetry: true });
        cycle.record("d", HostOutcome::Excluded { telemetry: false });

        let report = cycle.report();
        assert_eq!(report.hosts, 4);
        assert_eq!(report.telemetry_failures, 2);
        assert_eq!(report.excluded, 2);
        assert!(!report.cohort_defaulted);
        assert_eq!(cycle.outcome("a"), Some(HostOutcome::Scored(0.8)));
    }
}

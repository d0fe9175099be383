//! Dynamic weight derivation from the cohort profile

use crate::config::WeightPolicy;
use crate::models::{CohortWorkload, WeightVector};

/// Derive per-dimension weights for a cohort
///
/// Hot CPU or memory (fraction above the threshold) raises its own weight
/// and lowers the other one; hot I/O only raises its own weight. Every
/// weight is then clamped to `[0, policy.max_weight]`. The result is not
/// normalized; the score calculator divides by the actual sum.
pub fn derive_weights(cohort: &CohortWorkload, policy: &WeightPolicy) -> WeightVector {
    let mut w = policy.base;
    let hot = |fraction: f64| fraction > policy.threshold;

    if hot(cohort.cpu_fraction) {
        w.alpha += policy.bump;
        w.beta -= policy.compensation;
    }

    if hot(cohort.mem_fraction) {
        w.beta += policy.bump;
        w.alpha -= policy.compensation;
    }

    if hot(cohort.io_storage_fraction) {
        w.gamma += policy.bump;
    }

    if hot(cohort.io_network_fraction) {
        w.delta += policy.bump;
    }

    let clamp = |weight: f64| weight.clamp(0.0, policy.max_weight);
    WeightVector {
        alpha: clamp(w.alpha),
        beta: clamp(w.beta),
        gamma: clamp(w.gamma),
        delta: clamp(w.delta),
    }
}

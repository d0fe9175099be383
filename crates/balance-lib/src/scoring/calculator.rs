//! Raw balance score of a single host

use crate::error::{Result, ScoringError};
use crate::models::{clamp_unit, Dimension, HostUtilization, WeightVector};

/// Compute the weighted free-capacity score of a host, in [0, 1]
///
/// Each dimension contributes `clamp(1 - usage / capacity, 0, 1)`, so an
/// over-committed dimension contributes 0 rather than a negative value. The
/// weighted sum is divided by the sum of the weights actually used.
pub fn compute_raw_score(
    host: &str,
    utilization: &HostUtilization,
    weights: &WeightVector,
) -> Result<f64> {
    let weight_sum = weights.sum();
    if !(weight_sum.is_finite() && weight_sum > 0.0) {
        return Err(ScoringError::InvalidWeights(format!(
            "weight sum must be positive, got {}",
            weight_sum
        )));
    }

    let mut weighted = 0.0;
    for dimension in Dimension::ALL {
        let (usage, capacity) = utilization.dimension(dimension);
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ScoringError::InvalidCapacity {
                host: host.to_string(),
                dimension,
                value: capacity,
            });
        }

        weighted += weights.weight(dimension) * contribution(usage, capacity);
    }

    Ok(clamp_unit(weighted / weight_sum))
}

fn contribution(usage: f64, capacity: f64) -> f64 {
    clamp_unit(1.0 - usage.max(0.0) / capacity)
}

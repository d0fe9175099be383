//! Cross-host min-max normalization of raw scores

use crate::error::{Result, ScoringError};
use std::collections::HashMap;

/// Rescale raw scores of one cycle into `[0, max_score]`
///
/// The best host gets `max_score` and the worst gets 0. When every host has
/// the same raw score (including a single candidate) all of them get
/// `max_score`. Equal raw scores always map to equal normalized scores.
pub fn normalize_scores(
    raw_scores: &HashMap<String, f64>,
    max_score: i64,
) -> Result<HashMap<String, i64>> {
    if raw_scores.is_empty() {
        return Err(ScoringError::EmptyCandidateSet);
    }

    if let Some((host, score)) = raw_scores.iter().find(|(_, s)| !s.is_finite()) {
        return Err(ScoringError::InvalidRawScore {
            host: host.clone(),
            score: *score,
        });
    }

    let (min, max) = raw_scores
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });

    let range = max - min;
    let normalized = raw_scores
        .iter()
        .map(|(host, &raw)| {
            let score = if range == 0.0 {
                max_score
            } else {
                (max_score as f64 * (raw - min) / range).round() as i64
            };
            (host.clone(), score.clamp(0, max_score))
        })
        .collect();

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(host, score)| (host.to_string(), *score))
            .collect()
    }

    #[test]
    fn test_two_hosts_span_full_range() {
        let scores = normalize_scores(&raw(&[("a", 0.88), ("b", 0.40)]), 100).unwrap();
        assert_eq!(scores["a"], 100);
        assert_eq!(scores["b"], 0);
    }

    #[test]
    fn test_single_host_gets_max_score() {
        let scores = normalize_scores(&raw(&[("a", 0.12)]), 100).unwrap();
        assert_eq!(scores["a"], 100);
    }

    #[test]
    fn test_identical_scores_get_max_score() {
        let scores =
            normalize_scores(&raw(&[("a", 0.5), ("b", 0.5), ("c", 0.5), ("d", 0.5)]), 100)
                .unwrap();
        assert!(scores.values().all(|&s| s == 100));
    }

    #[test]
    fn test_rank_order_is_preserved() {
        let input = raw(&[
            ("a", 0.91),
            ("b", 0.10),
            ("c", 0.55),
            ("d", 0.551),
            ("e", 0.30),
        ]);
        let scores = normalize_scores(&input, 100).unwrap();

        for (h1, r1) in &input {
            for (h2, r2) in &input {
                if r1 > r2 {
                    assert!(scores[h1] >= scores[h2], "{} vs {}", h1, h2);
                }
            }
        }
        assert_eq!(scores["a"], 100);
        assert_eq!(scores["b"], 0);
        assert_eq!(scores["c"], 56);
    }

    #[test]
    fn test_ties_map_to_equal_scores() {
        let scores = normalize_scores(&raw(&[("a", 0.9), ("b", 0.6), ("c", 0.6), ("d", 0.1)]), 10)
            .unwrap();
        assert_eq!(scores["b"], scores["c"]);
        assert_eq!(scores["b"], 6);
    }

    #[test]
    fn test_empty_candidate_set_is_an_error() {
        let err = normalize_scores(&HashMap::new(), 100).unwrap_err();
        assert!(matches!(err, ScoringError::EmptyCandidateSet));
    }

    #[test]
    fn test_non_finite_score_is_rejected() {
        let err = normalize_scores(&raw(&[("a", 0.5), ("b", f64::NAN)]), 100).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidRawScore { .. }));
    }
}

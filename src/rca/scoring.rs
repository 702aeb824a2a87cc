//! Chain scoring (§4.6.2): each step's score is its evidence score × ring
//! weight, nudged by an additive KPI-sentiment bias and a dimension-alignment
//! bonus/penalty; the chain score is the geometric mean of the per-step
//! scores. Sentiment bias is additive per the resolved open question — a chain
//! touching a KPI whose sentiment says "higher is bad" gets nudged up, "higher
//! is good" gets nudged down — and both the bias and the alignment term apply
//! per step, so one misaligned step among otherwise-aligned ones pulls the
//! chain down without wiping out the rest.

use std::collections::HashMap;

use crate::models::kpi::Sentiment;
use crate::models::rca::{Ring, RcaStep};

pub fn ring_weight(ring: Ring, weights: &HashMap<String, f64>) -> f64 {
    weights.get(ring.label()).copied().unwrap_or(0.1)
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    pub alignment_bonus: f64,
    pub alignment_penalty: f64,
    pub scoring_bias_kpi_negative: f64,
    pub scoring_bias_kpi_positive: f64,
}

/// `aligned` carries one flag per step: whether that step's evidence matched
/// a configured dimension key. Must be the same length as `steps`.
pub fn score_chain(
    steps: &[RcaStep],
    ring_weights: &HashMap<String, f64>,
    kpi_sentiment: Option<Sentiment>,
    aligned: &[bool],
    params: &ScoringParams,
) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    let n = steps.len() as f64;
    let product: f64 = steps
        .iter()
        .zip(aligned.iter())
        .map(|(s, &step_aligned)| {
            let mut step_score = s.score * ring_weight(s.ring, ring_weights);
            match kpi_sentiment {
                Some(Sentiment::Negative) => step_score += params.scoring_bias_kpi_negative,
                Some(Sentiment::Positive) => step_score -= params.scoring_bias_kpi_positive,
                Some(Sentiment::Neutral) | None => {}
            }
            step_score += if step_aligned {
                params.alignment_bonus
            } else {
                -params.alignment_penalty
            };
            step_score.max(1e-6)
        })
        .product();

    product.powf(1.0 / n).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rca::Direction;
    use chrono::Utc;

    fn step(ring: Ring, score: f64) -> RcaStep {
        RcaStep {
            why_index: 1,
            service: "checkout".into(),
            component: "service".into(),
            time_start: Utc::now(),
            time_end: Utc::now(),
            ring,
            direction: Direction::Upstream,
            distance: 1,
            evidence: vec![],
            summary: String::new(),
            score,
        }
    }

    fn weights() -> HashMap<String, f64> {
        HashMap::from([
            ("R0".to_string(), 1.0),
            ("R1".to_string(), 0.8),
            ("R2".to_string(), 0.5),
            ("R3".to_string(), 0.2),
        ])
    }

    fn params() -> ScoringParams {
        ScoringParams {
            alignment_bonus: 0.10,
            alignment_penalty: 0.20,
            scoring_bias_kpi_negative: 0.05,
            scoring_bias_kpi_positive: 0.05,
        }
    }

    #[test]
    fn closer_ring_scores_higher_all_else_equal() {
        let r0 = score_chain(&[step(Ring::R0, 0.8)], &weights(), None, &[true], &params());
        let r3 = score_chain(&[step(Ring::R3, 0.8)], &weights(), None, &[true], &params());
        assert!(r0 > r3);
    }

    #[test]
    fn negative_sentiment_raises_score_positive_lowers_it() {
        let base = score_chain(&[step(Ring::R1, 0.5)], &weights(), None, &[true], &params());
        let negative = score_chain(&[step(Ring::R1, 0.5)], &weights(), Some(Sentiment::Negative), &[true], &params());
        let positive = score_chain(&[step(Ring::R1, 0.5)], &weights(), Some(Sentiment::Positive), &[true], &params());
        assert!(negative > base);
        assert!(positive < base);
    }

    #[test]
    fn misaligned_dimension_is_penalized() {
        let aligned = score_chain(&[step(Ring::R1, 0.5)], &weights(), None, &[true], &params());
        let misaligned = score_chain(&[step(Ring::R1, 0.5)], &weights(), None, &[false], &params());
        assert!(aligned > misaligned);
    }

    #[test]
    fn one_misaligned_step_is_penalized_less_than_all_misaligned() {
        let steps = vec![step(Ring::R1, 0.5), step(Ring::R1, 0.5)];
        let one_misaligned = score_chain(&steps, &weights(), None, &[true, false], &params());
        let all_misaligned = score_chain(&steps, &weights(), None, &[false, false], &params());
        let all_aligned = score_chain(&steps, &weights(), None, &[true, true], &params());
        assert!(all_aligned > one_misaligned);
        assert!(one_misaligned > all_misaligned);
    }

    #[test]
    fn empty_chain_scores_zero() {
        assert_eq!(score_chain(&[], &weights(), None, &[], &params()), 0.0);
    }
}

//! `AnomalyScorer` — pluggable single-series anomaly detection for RCA's
//! evidence-harvesting step (§4.6.1). `EwmaAnomalyScorer` ports the teacher's
//! `ewma_eval` (warmup window, EWMA mean/variance with a variance floor,
//! deviation reported only for the series' last point) verbatim in spirit,
//! generalized into a trait so a different detector can be swapped in later.

pub struct AnomalyScore {
    pub anomalous: bool,
    pub mean: f64,
    pub deviation: f64,
}

pub trait AnomalyScorer: Send + Sync {
    /// Evaluates whether the last point in `data` is anomalous relative to the
    /// series that precedes it.
    fn score(&self, data: &[f64]) -> AnomalyScore;
}

pub struct EwmaAnomalyScorer {
    pub alpha: f64,
    pub sensitivity: f64,
}

impl Default for EwmaAnomalyScorer {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            sensitivity: 3.0,
        }
    }
}

impl AnomalyScorer for EwmaAnomalyScorer {
    fn score(&self, data: &[f64]) -> AnomalyScore {
        let warmup = 12.min(data.len());
        if warmup == 0 {
            return AnomalyScore {
                anomalous: false,
                mean: 0.0,
                deviation: 0.0,
            };
        }

        let mut mean = data[..warmup].iter().sum::<f64>() / warmup as f64;
        let mut variance = data[..warmup].iter().map(|v| (v - mean).powi(2)).sum::<f64>() / warmup as f64;
        let min_var = variance * 0.3;

        let mut last = AnomalyScore {
            anomalous: false,
            mean: 0.0,
            deviation: 0.0,
        };

        for (i, &val) in data.iter().enumerate() {
            let std = variance.sqrt();
            let upper = mean + self.sensitivity * std;
            let lower = (mean - self.sensitivity * std).max(0.0);
            let is_anomaly = i >= warmup && (val > upper || val < lower);

            if i > 0 && !is_anomaly {
                let diff = val - mean;
                mean = self.alpha * val + (1.0 - self.alpha) * mean;
                let va = self.alpha * 0.25;
                variance = (va * diff * diff + (1.0 - va) * variance).max(min_var);
            }

            if i == data.len() - 1 {
                let dev = if std > 0.0 { (val - mean).abs() / std } else { 0.0 };
                last = AnomalyScore {
                    anomalous: is_anomaly,
                    mean,
                    deviation: dev,
                };
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_is_never_anomalous() {
        let scorer = EwmaAnomalyScorer::default();
        let data = vec![10.0; 30];
        let result = scorer.score(&data);
        assert!(!result.anomalous);
    }

    #[test]
    fn sudden_spike_after_stable_baseline_is_anomalous() {
        let scorer = EwmaAnomalyScorer::default();
        let mut data = vec![10.0; 20];
        data.push(500.0);
        let result = scorer.score(&data);
        assert!(result.anomalous);
        assert!(result.deviation > 1.0);
    }

    #[test]
    fn short_series_below_warmup_is_never_anomalous() {
        let scorer = EwmaAnomalyScorer::default();
        let result = scorer.score(&[1.0, 2.0, 3.0]);
        assert!(!result.anomalous);
    }
}

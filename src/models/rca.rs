//! RCA request/response shapes (§3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsWorse,
    LowerIsWorse,
}

impl Default for MetricDirection {
    fn default() -> Self {
        MetricDirection::HigherIsWorse
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaRequest {
    pub impact_service: Option<String>,
    pub impact_kpi_id: Option<String>,
    #[serde(default = "default_impact_metric")]
    pub impact_metric: String,
    #[serde(default)]
    pub metric_direction: MetricDirection,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(default = "default_severity")]
    pub severity: f64,
    #[serde(default = "default_max_chains")]
    pub max_chains: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps_per_chain: usize,
    #[serde(default = "default_min_score")]
    pub min_score_threshold: f64,
    #[serde(default)]
    pub dimension_config: Vec<String>,
}

fn default_impact_metric() -> String {
    "error_rate".to_string()
}
fn default_severity() -> f64 {
    0.5
}
fn default_max_chains() -> usize {
    10
}
fn default_max_steps() -> usize {
    5
}
fn default_min_score() -> f64 {
    0.1
}

impl RcaRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.time_end <= self.time_start {
            return Err(CoreError::validation(
                "time_end",
                "RCA window must be non-empty",
            ));
        }
        if self.impact_service.is_none() && self.impact_kpi_id.is_none() {
            return Err(CoreError::validation(
                "impact_service",
                "RCA request needs impact_service or impact_kpi_id",
            ));
        }
        if !(0.0..=1.0).contains(&self.severity) {
            return Err(CoreError::validation("severity", "severity must be in [0,1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ring {
    R0,
    R1,
    R2,
    R3,
}

impl Ring {
    pub fn label(&self) -> &'static str {
        match self {
            Ring::R0 => "R0",
            Ring::R1 => "R1",
            Ring::R2 => "R2",
            Ring::R3 => "R3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Upstream,
    Downstream,
    Same,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaStep {
    pub why_index: u32,
    pub service: String,
    pub component: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub ring: Ring,
    pub direction: Direction,
    pub distance: u32,
    pub evidence: Vec<Evidence>,
    pub summary: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainState {
    Proposed,
    Scored,
    Accepted,
    RejectedBelowThreshold,
    RejectedNoEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaChain {
    pub steps: Vec<RcaStep>,
    pub score: f64,
    pub rank: u32,
    pub impact_path: Vec<String>,
    pub duration_hops: u32,
    pub state: ChainState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(default)]
    pub missing_labels: Vec<String>,
    #[serde(default)]
    pub reduced_accuracy_reasons: Vec<String>,
    #[serde(default)]
    pub metrics_query_errors: Vec<String>,
    #[serde(default)]
    pub detection_status: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcaIncident {
    pub impact_service: String,
    pub impact_metric: String,
    pub metric_name_uuid: Option<String>,
    pub peak_time: Option<DateTime<Utc>>,
    pub chains: Vec<RcaChain>,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_window_rejected() {
        let t = Utc.timestamp_opt(1000, 0).single().unwrap();
        let req = RcaRequest {
            impact_service: Some("checkout".into()),
            impact_kpi_id: None,
            impact_metric: default_impact_metric(),
            metric_direction: MetricDirection::HigherIsWorse,
            time_start: t,
            time_end: t,
            severity: 0.5,
            max_chains: 10,
            max_steps_per_chain: 5,
            min_score_threshold: 0.1,
            dimension_config: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn missing_impact_target_rejected() {
        let start = Utc.timestamp_opt(1000, 0).single().unwrap();
        let end = Utc.timestamp_opt(2000, 0).single().unwrap();
        let req = RcaRequest {
            impact_service: None,
            impact_kpi_id: None,
            impact_metric: default_impact_metric(),
            metric_direction: MetricDirection::HigherIsWorse,
            time_start: start,
            time_end: end,
            severity: 0.5,
            max_chains: 10,
            max_steps_per_chain: 5,
            min_score_threshold: 0.1,
            dimension_config: vec![],
        };
        assert!(req.validate().is_err());
    }
}

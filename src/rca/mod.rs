//! The RCA Engine (§4.6): impact resolution → peak detection → upstream chain
//! enumeration over the service graph → evidence harvesting → scoring → a
//! small accept/reject state machine. `impact_service` is resolved by the
//! caller (the KPI/RCA HTTP handler, via the registry) rather than by this
//! module, keeping the RCA pipeline decoupled from `ObjectStore` the same way
//! the engine stays decoupled from the registry.

pub mod anomaly;
pub mod scoring;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backend::{MetricsClient, PromData};
use crate::config::RcaConfig;
use crate::error::CoreError;
use crate::models::kpi::Sentiment;
use crate::models::rca::{
    ChainState, Diagnostics, Direction, Evidence, MetricDirection, RcaChain, RcaIncident, RcaRequest, RcaStep, Ring,
};
use crate::models::service_graph::ServiceGraphData;

use anomaly::AnomalyScorer;
use scoring::ScoringParams;

pub struct RcaEngine {
    metrics: Arc<dyn MetricsClient>,
    scorer: Arc<dyn AnomalyScorer>,
    config: RcaConfig,
}

/// `bounds` is `[R0_max, R1_max, R2_max]` seconds-from-peak (§4.6's rings,
/// overridable via `RcaConfig::ring_bounds_secs`); anything past `bounds[2]`
/// falls in R3.
fn ring_for(at: DateTime<Utc>, peak: DateTime<Utc>, bounds: [u64; 3]) -> Ring {
    let diff = (at - peak).num_seconds().unsigned_abs();
    if diff <= bounds[0] {
        Ring::R0
    } else if diff <= bounds[1] {
        Ring::R1
    } else if diff <= bounds[2] {
        Ring::R2
    } else {
        Ring::R3
    }
}

fn selector_for(metric: &str, service: &str) -> String {
    format!("{metric}{{service=\"{service}\"}}")
}

fn series_values(resp: crate::backend::PromResponse) -> Vec<(DateTime<Utc>, f64)> {
    match resp.data {
        Some(PromData::Matrix(series)) | Some(PromData::Vector(series)) => series
            .into_iter()
            .flat_map(|s| s.samples.into_iter().map(|p| (p.timestamp, p.value)))
            .collect(),
        _ => vec![],
    }
}

impl RcaEngine {
    pub fn new(metrics: Arc<dyn MetricsClient>, scorer: Arc<dyn AnomalyScorer>, config: RcaConfig) -> Self {
        Self { metrics, scorer, config }
    }

    async fn find_peak(
        &self,
        request: &RcaRequest,
        impact_service: &str,
        diagnostics: &mut Diagnostics,
    ) -> DateTime<Utc> {
        let selector = selector_for(&request.impact_metric, impact_service);
        match self
            .metrics
            .range_query(&selector, request.time_start, request.time_end, Duration::from_secs(60))
            .await
        {
            Ok(resp) => {
                let points = series_values(resp);
                if points.is_empty() {
                    diagnostics
                        .metrics_query_errors
                        .push(format!("no data points for impact metric `{selector}`"));
                    return request.time_end;
                }
                let extreme = match request.metric_direction {
                    MetricDirection::HigherIsWorse => points.iter().max_by(|a, b| a.1.total_cmp(&b.1)),
                    MetricDirection::LowerIsWorse => points.iter().min_by(|a, b| a.1.total_cmp(&b.1)),
                };
                extreme.map(|(t, _)| *t).unwrap_or(request.time_end)
            }
            Err(e) => {
                tracing::warn!("peak detection query failed: {e}");
                diagnostics.metrics_query_errors.push(e.to_string());
                request.time_end
            }
        }
    }

    async fn harvest(
        &self,
        service: &str,
        request: &RcaRequest,
        diagnostics: &mut Diagnostics,
    ) -> Option<(anomaly::AnomalyScore, DateTime<Utc>)> {
        let selector = selector_for(&request.impact_metric, service);
        match self
            .metrics
            .range_query(&selector, request.time_start, request.time_end, Duration::from_secs(60))
            .await
        {
            Ok(resp) => {
                let points = series_values(resp);
                if points.is_empty() {
                    diagnostics.missing_labels.push(service.to_string());
                    return None;
                }
                let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
                let at = points.last().map(|(t, _)| *t).unwrap_or(request.time_end);
                Some((self.scorer.score(&values), at))
            }
            Err(e) => {
                tracing::warn!("evidence query for {service} failed: {e}");
                diagnostics.metrics_query_errors.push(e.to_string());
                None
            }
        }
    }

    pub async fn analyze(
        &self,
        request: &RcaRequest,
        impact_service: &str,
        graph: &ServiceGraphData,
        kpi_sentiment: Option<Sentiment>,
    ) -> Result<RcaIncident, CoreError> {
        request.validate()?;

        let mut diagnostics = Diagnostics::default();
        let peak_time = self.find_peak(request, impact_service, &mut diagnostics).await;

        let mut chains = self.enumerate_chains(impact_service, graph, peak_time, request, &mut diagnostics).await;

        if chains.is_empty() {
            diagnostics
                .reduced_accuracy_reasons
                .push("no upstream anomalies found within the requested window".to_string());
        }

        let weights = &self.config.ring_weights;
        let params = ScoringParams {
            alignment_bonus: self.config.alignment_bonus,
            alignment_penalty: self.config.alignment_penalty,
            scoring_bias_kpi_negative: self.config.scoring_bias_kpi_negative,
            scoring_bias_kpi_positive: self.config.scoring_bias_kpi_positive,
        };

        for chain in &mut chains {
            // A step whose evidence names one of the dimension_config keys is
            // "aligned"; with no dimension_config configured every step counts
            // as aligned (nothing to disagree with). Scored per step so one
            // misaligned step doesn't flatten an otherwise-aligned chain.
            let aligned: Vec<bool> = chain
                .steps
                .iter()
                .map(|s| {
                    request.dimension_config.is_empty()
                        || request
                            .dimension_config
                            .iter()
                            .any(|d| s.evidence.iter().any(|e| &e.kind == d))
                })
                .collect();
            chain.score = scoring::score_chain(&chain.steps, weights, kpi_sentiment, &aligned, &params);
            chain.state = if chain.steps.is_empty() {
                ChainState::RejectedNoEvidence
            } else if chain.score < request.min_score_threshold {
                ChainState::RejectedBelowThreshold
            } else {
                ChainState::Accepted
            };
        }

        chains.sort_by(|a, b| b.score.total_cmp(&a.score));
        if chains.len() > request.max_chains {
            diagnostics
                .reduced_accuracy_reasons
                .push(format!("truncated to top {} of {} candidate chains", request.max_chains, chains.len()));
            chains.truncate(request.max_chains);
        }
        for (i, chain) in chains.iter_mut().enumerate() {
            chain.rank = i as u32 + 1;
        }

        diagnostics.detection_status.push("ewma".to_string());

        Ok(RcaIncident {
            impact_service: impact_service.to_string(),
            impact_metric: request.impact_metric.clone(),
            metric_name_uuid: None,
            peak_time: Some(peak_time),
            chains,
            diagnostics,
        })
    }

    async fn enumerate_chains(
        &self,
        root: &str,
        graph: &ServiceGraphData,
        peak_time: DateTime<Utc>,
        request: &RcaRequest,
        diagnostics: &mut Diagnostics,
    ) -> Vec<RcaChain> {
        let mut chains = Vec::new();
        let mut stack: Vec<(String, u32, Vec<RcaStep>, HashSet<String>)> =
            vec![(root.to_string(), 0, vec![], HashSet::from([root.to_string()]))];
        let explore_cap = (request.max_chains * 8).max(32);

        while let Some((current, depth, path, visited)) = stack.pop() {
            if chains.len() >= explore_cap {
                diagnostics
                    .reduced_accuracy_reasons
                    .push("chain exploration stopped early at the candidate cap".to_string());
                break;
            }
            if depth >= request.max_steps_per_chain as u32 {
                continue;
            }
            let upstream: Vec<String> = graph
                .edges
                .iter()
                .filter(|e| e.target == current)
                .map(|e| e.source.clone())
                .collect();

            for neighbour in upstream {
                if visited.contains(&neighbour) {
                    continue;
                }
                let Some((score, at)) = self.harvest(&neighbour, request, diagnostics).await else {
                    continue;
                };
                if !score.anomalous {
                    continue;
                }

                let step = RcaStep {
                    why_index: depth + 1,
                    service: neighbour.clone(),
                    component: "service".to_string(),
                    time_start: at - chrono::Duration::minutes(1),
                    time_end: at,
                    ring: ring_for(at, peak_time, self.config.ring_bounds_secs),
                    direction: Direction::Upstream,
                    distance: depth + 1,
                    evidence: vec![Evidence {
                        kind: "metric_anomaly".to_string(),
                        id: request.impact_metric.clone(),
                        details: format!("deviation={:.2} mean={:.2}", score.deviation, score.mean),
                    }],
                    summary: format!("`{neighbour}` deviated from its baseline around {at}"),
                    score: (score.deviation / (score.deviation + 3.0)).clamp(0.0, 1.0),
                };

                let mut new_path = path.clone();
                new_path.push(step);
                let impact_path: Vec<String> = std::iter::once(root.to_string())
                    .chain(new_path.iter().map(|s| s.service.clone()))
                    .collect();
                chains.push(RcaChain {
                    steps: new_path.clone(),
                    score: 0.0,
                    rank: 0,
                    impact_path,
                    duration_hops: depth + 1,
                    state: ChainState::Proposed,
                });

                let mut new_visited = visited.clone();
                new_visited.insert(neighbour.clone());
                stack.push((neighbour, depth + 1, new_path, new_visited));
            }
        }
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockMetricsClient;
    use crate::backend::{Sample, Series};
    use crate::models::service_graph::{ServiceGraphEdge, ServiceGraphWindow};
    use crate::time_range::TimeRange;
    use anomaly::EwmaAnomalyScorer;
    use std::collections::BTreeMap as Map;

    fn flat_then_spike(service: &str, at: DateTime<Utc>) -> Series {
        let mut samples: Vec<Sample> = (0..20)
            .map(|i| Sample {
                timestamp: at - chrono::Duration::minutes(20 - i),
                value: 10.0,
            })
            .collect();
        samples.push(Sample { timestamp: at, value: 500.0 });
        Series {
            labels: Map::from([("service".to_string(), service.to_string())]),
            samples,
        }
    }

    fn graph(edges: Vec<ServiceGraphEdge>, end: DateTime<Utc>) -> ServiceGraphData {
        ServiceGraphData {
            window: ServiceGraphWindow {
                range: TimeRange::new(end - chrono::Duration::minutes(30), end).unwrap(),
                client: None,
                server: None,
                connection_type: None,
            },
            edges,
        }
    }

    fn edge(source: &str, target: &str) -> ServiceGraphEdge {
        ServiceGraphEdge {
            source: source.into(),
            target: target.into(),
            connection_type: "http".into(),
            call_count: 10,
            call_rate: 1.0,
            error_count: 0,
            error_rate: 0.0,
            server_latency_ms: 5.0,
            client_latency_ms: 5.0,
            unpaired_spans: 0,
            dropped_spans: 0,
        }
    }

    fn base_request(start: DateTime<Utc>, end: DateTime<Utc>) -> RcaRequest {
        RcaRequest {
            impact_service: Some("checkout".into()),
            impact_kpi_id: None,
            impact_metric: "error_rate".into(),
            metric_direction: MetricDirection::HigherIsWorse,
            time_start: start,
            time_end: end,
            severity: 0.5,
            max_chains: 5,
            max_steps_per_chain: 3,
            min_score_threshold: 0.01,
            dimension_config: vec![],
        }
    }

    #[tokio::test]
    async fn finds_upstream_chain_through_anomalous_neighbour() {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(30);
        let metrics = MockMetricsClient::new()
            .with_series("error_rate{service=\"checkout\"}", vec![flat_then_spike("checkout", end)])
            .with_series("error_rate{service=\"payments\"}", vec![flat_then_spike("payments", end)]);
        let engine = RcaEngine::new(Arc::new(metrics), Arc::new(EwmaAnomalyScorer::default()), RcaConfig::default());
        let g = graph(vec![edge("payments", "checkout")], end);
        let request = base_request(start, end);

        let incident = engine.analyze(&request, "checkout", &g, None).await.unwrap();
        assert!(!incident.chains.is_empty());
        let top = &incident.chains[0];
        assert_eq!(top.state, ChainState::Accepted);
        assert_eq!(top.steps[0].service, "payments");
    }

    #[tokio::test]
    async fn no_upstream_anomaly_yields_no_accepted_chains() {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(30);
        let metrics = MockMetricsClient::new()
            .with_series("error_rate{service=\"checkout\"}", vec![flat_then_spike("checkout", end)]);
        let engine = RcaEngine::new(Arc::new(metrics), Arc::new(EwmaAnomalyScorer::default()), RcaConfig::default());
        let g = graph(vec![edge("payments", "checkout")], end);
        let request = base_request(start, end);

        let incident = engine.analyze(&request, "checkout", &g, None).await.unwrap();
        assert!(incident.chains.is_empty());
        assert!(!incident.diagnostics.reduced_accuracy_reasons.is_empty());
    }

    #[tokio::test]
    async fn rejects_chains_below_min_score_threshold() {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(30);
        let metrics = MockMetricsClient::new()
            .with_series("error_rate{service=\"checkout\"}", vec![flat_then_spike("checkout", end)])
            .with_series("error_rate{service=\"payments\"}", vec![flat_then_spike("payments", end)]);
        let engine = RcaEngine::new(Arc::new(metrics), Arc::new(EwmaAnomalyScorer::default()), RcaConfig::default());
        let g = graph(vec![edge("payments", "checkout")], end);
        let mut request = base_request(start, end);
        request.min_score_threshold = 0.999;

        let incident = engine.analyze(&request, "checkout", &g, None).await.unwrap();
        assert_eq!(incident.chains[0].state, ChainState::RejectedBelowThreshold);
    }
}

//! `ServiceGraphBuilder` (§4.5): turns the six pre-aggregated span-edge counters
//! seeded by `registry::seed` into a directed topology, rate-converting counts
//! over the requested window. Grounded in the teacher's `handlers/services.rs`
//! SQL-join-then-shape pattern, generalized from a single ClickHouse query to a
//! handful of independent `MetricsClient` instant queries (one per counter
//! family) that get zipped back together by `(source, target, connection_type)`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{MetricsClient, PromData};
use crate::error::CoreError;
use crate::models::service_graph::{ServiceGraphData, ServiceGraphEdge, ServiceGraphWindow};

const METRIC_REQUEST_TOTAL: &str = "traces_service_graph_request_total";
const METRIC_REQUEST_FAILED_TOTAL: &str = "traces_service_graph_request_failed_total";
const METRIC_SERVER_SECONDS: &str = "traces_service_graph_request_server_seconds";
const METRIC_CLIENT_SECONDS: &str = "traces_service_graph_request_client_seconds";
const METRIC_UNPAIRED_SPANS: &str = "traces_service_graph_unpaired_spans_total";
const METRIC_DROPPED_SPANS: &str = "traces_service_graph_dropped_spans_total";

pub struct ServiceGraphBuilder {
    metrics: Arc<dyn MetricsClient>,
}

#[derive(Default, Clone)]
struct EdgeAccumulator {
    call_count: u64,
    error_count: u64,
    server_latency_ms: f64,
    client_latency_ms: f64,
    unpaired_spans: u64,
    dropped_spans: u64,
}

type EdgeKey = (String, String, String);

impl ServiceGraphBuilder {
    pub fn new(metrics: Arc<dyn MetricsClient>) -> Self {
        Self { metrics }
    }

    pub async fn build(&self, window: ServiceGraphWindow) -> Result<ServiceGraphData, CoreError> {
        let mut acc: BTreeMap<EdgeKey, EdgeAccumulator> = BTreeMap::new();

        self.accumulate(&mut acc, METRIC_REQUEST_TOTAL, |a, v| a.call_count = v as u64)
            .await?;
        self.accumulate(&mut acc, METRIC_REQUEST_FAILED_TOTAL, |a, v| a.error_count = v as u64)
            .await?;
        self.accumulate(&mut acc, METRIC_SERVER_SECONDS, |a, v| a.server_latency_ms = v * 1000.0)
            .await?;
        self.accumulate(&mut acc, METRIC_CLIENT_SECONDS, |a, v| a.client_latency_ms = v * 1000.0)
            .await?;
        self.accumulate(&mut acc, METRIC_UNPAIRED_SPANS, |a, v| a.unpaired_spans = v as u64)
            .await?;
        self.accumulate(&mut acc, METRIC_DROPPED_SPANS, |a, v| a.dropped_spans = v as u64)
            .await?;

        let window_secs = window.range.duration().num_seconds().max(1) as f64;

        let mut edges: Vec<ServiceGraphEdge> = acc
            .into_iter()
            .filter(|((source, target, conn), _)| {
                window.client.as_deref().map(|c| c == source).unwrap_or(true)
                    && window.server.as_deref().map(|s| s == target).unwrap_or(true)
                    && window.connection_type.as_deref().map(|t| t == conn).unwrap_or(true)
            })
            .map(|((source, target, connection_type), a)| ServiceGraphEdge {
                source,
                target,
                connection_type,
                call_count: a.call_count,
                call_rate: a.call_count as f64 / window_secs,
                error_count: a.error_count,
                error_rate: if a.call_count == 0 {
                    0.0
                } else {
                    a.error_count as f64 / a.call_count as f64
                },
                server_latency_ms: a.server_latency_ms,
                client_latency_ms: a.client_latency_ms,
                unpaired_spans: a.unpaired_spans,
                dropped_spans: a.dropped_spans,
            })
            .collect();

        edges.sort_by(|a, b| (a.source.as_str(), a.target.as_str()).cmp(&(b.source.as_str(), b.target.as_str())));

        Ok(ServiceGraphData { window, edges })
    }

    async fn accumulate(
        &self,
        acc: &mut BTreeMap<EdgeKey, EdgeAccumulator>,
        metric: &str,
        set: impl Fn(&mut EdgeAccumulator, f64),
    ) -> Result<(), CoreError> {
        let resp = self.metrics.instant_query(metric, chrono::Utc::now()).await?;
        let series = match resp.data {
            Some(PromData::Vector(s)) | Some(PromData::Matrix(s)) => s,
            _ => return Ok(()),
        };
        for s in series {
            let source = s.labels.get("client").or_else(|| s.labels.get("source")).cloned().unwrap_or_default();
            let target = s.labels.get("server").or_else(|| s.labels.get("target")).cloned().unwrap_or_default();
            let conn = s.labels.get("connection_type").cloned().unwrap_or_else(|| "unknown".to_string());
            let value = s.samples.last().map(|s| s.value).unwrap_or(0.0);
            let entry = acc.entry((source, target, conn)).or_default();
            set(entry, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockMetricsClient;
    use crate::backend::{Sample, Series};
    use crate::time_range::TimeRange;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap as Map;

    fn series(client: &str, server: &str, value: f64) -> Series {
        Series {
            labels: Map::from([
                ("client".to_string(), client.to_string()),
                ("server".to_string(), server.to_string()),
                ("connection_type".to_string(), "http".to_string()),
            ]),
            samples: vec![Sample {
                timestamp: Utc::now(),
                value,
            }],
        }
    }

    #[tokio::test]
    async fn builds_edge_from_request_total_and_failed_total() {
        let metrics = MockMetricsClient::new()
            .with_series(METRIC_REQUEST_TOTAL, vec![series("frontend", "checkout", 100.0)])
            .with_series(METRIC_REQUEST_FAILED_TOTAL, vec![series("frontend", "checkout", 5.0)]);
        let builder = ServiceGraphBuilder::new(Arc::new(metrics));
        let end = Utc::now();
        let window = ServiceGraphWindow {
            range: TimeRange::new(end - Duration::seconds(60), end).unwrap(),
            client: None,
            server: None,
            connection_type: None,
        };
        let data = builder.build(window).await.unwrap();
        assert_eq!(data.edges.len(), 1);
        let edge = &data.edges[0];
        assert_eq!(edge.source, "frontend");
        assert_eq!(edge.target, "checkout");
        assert_eq!(edge.call_count, 100);
        assert_eq!(edge.error_count, 5);
        assert!((edge.error_rate - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn client_filter_narrows_edges() {
        let metrics = MockMetricsClient::new().with_series(
            METRIC_REQUEST_TOTAL,
            vec![series("frontend", "checkout", 10.0), series("mobile", "checkout", 20.0)],
        );
        let builder = ServiceGraphBuilder::new(Arc::new(metrics));
        let end = Utc::now();
        let window = ServiceGraphWindow {
            range: TimeRange::new(end - Duration::seconds(60), end).unwrap(),
            client: Some("mobile".to_string()),
            server: None,
            connection_type: None,
        };
        let data = builder.build(window).await.unwrap();
        assert_eq!(data.edges.len(), 1);
        assert_eq!(data.edges[0].source, "mobile");
    }

    #[test]
    fn neighbours_finds_edges_touching_service() {
        let data = ServiceGraphData {
            window: ServiceGraphWindow {
                range: TimeRange::new(Utc::now() - Duration::seconds(60), Utc::now()).unwrap(),
                client: None,
                server: None,
                connection_type: None,
            },
            edges: vec![ServiceGraphEdge {
                source: "frontend".into(),
                target: "checkout".into(),
                connection_type: "http".into(),
                call_count: 1,
                call_rate: 1.0,
                error_count: 0,
                error_rate: 0.0,
                server_latency_ms: 1.0,
                client_latency_ms: 1.0,
                unpaired_spans: 0,
                dropped_spans: 0,
            }],
        };
        assert_eq!(data.neighbours("checkout").len(), 1);
        assert_eq!(data.neighbours("billing").len(), 0);
    }
}

//! The Unified Query Engine (§4.4): routes a `UnifiedQuery` to one or more
//! backends, fans correlation sub-expressions out concurrently under a
//! per-engine deadline, and assembles the result. Modeled on the teacher's
//! `AppState`-holds-the-backends-as-trait-objects shape, generalized from one
//! concrete ClickHouse client to three narrow `*Client` traits.

pub mod cache;
pub mod join;
pub mod uql;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::backend::{LogsClient, MetricsClient, PromData, TracesClient};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::correlation::{CorrelationExpression, Engine as QEngine};
use crate::models::result::{CorrelationSummary, Record, ResultMetadata, ResultStatus, UnifiedResult};
use crate::models::unified_query::{QueryType, UnifiedQuery};
use crate::models::uql::{UqlExpression, UqlQuery};
use crate::query_lang;
use crate::time_range::TimeRange;

use cache::KVCache;

const DEFAULT_WINDOW_SECS: i64 = 15 * 60;

pub struct UnifiedQueryEngine {
    metrics: Arc<dyn MetricsClient>,
    logs: Arc<dyn LogsClient>,
    traces: Arc<dyn TracesClient>,
    config: EngineConfig,
    cache: KVCache,
}

impl UnifiedQueryEngine {
    pub fn new(
        metrics: Arc<dyn MetricsClient>,
        logs: Arc<dyn LogsClient>,
        traces: Arc<dyn TracesClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            metrics,
            logs,
            traces,
            config,
            cache: KVCache::new(),
        }
    }

    fn resolve_time_range(&self, query: &UnifiedQuery) -> Result<TimeRange, CoreError> {
        let end = query.end.unwrap_or_else(Utc::now);
        let start = query
            .start
            .unwrap_or_else(|| end - chrono::Duration::seconds(DEFAULT_WINDOW_SECS));
        TimeRange::new(start, end)
    }

    fn sub_query_timeout(&self, query: &UnifiedQuery) -> Duration {
        query
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.sub_query_timeout_secs))
    }

    pub async fn execute(&self, query: &UnifiedQuery) -> Result<UnifiedResult, CoreError> {
        let key = cache::cache_key(query);
        if !query.cache_options.bypass_cache {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached);
            }
        }

        let result = match query.query_type {
            QueryType::Metrics => self.execute_single(query, QEngine::Metrics).await?,
            QueryType::Logs => self.execute_single(query, QEngine::Logs).await?,
            QueryType::Traces => self.execute_single(query, QEngine::Traces).await?,
            QueryType::Correlation => self.execute_correlation(query).await?,
        };

        if !query.cache_options.bypass_cache && result.status == ResultStatus::Success {
            let ttl = query
                .cache_options
                .ttl
                .unwrap_or_else(|| Duration::from_secs(self.config.cache_ttl_secs));
            self.cache.put(key, result.clone(), ttl);
        }
        Ok(result)
    }

    async fn run_one(&self, engine: QEngine, query_text: &str, range: TimeRange) -> Result<Vec<Record>, CoreError> {
        match engine {
            QEngine::Metrics => {
                let resp = self.metrics.range_query(query_text, range.start, range.end, Duration::from_secs(15)).await?;
                Ok(prom_response_to_records(resp))
            }
            QEngine::Logs => {
                let result = self.logs.search(query_text, range, 1000, None).await?;
                Ok(result
                    .rows
                    .into_iter()
                    .map(|row| Record {
                        timestamp: row.timestamp,
                        engine: QEngine::Logs,
                        labels: Default::default(),
                        value: serde_json::Value::Object(row.fields.into_iter().collect()),
                    })
                    .collect())
            }
            QEngine::Traces => {
                let traces = self
                    .traces
                    .search_traces(&Default::default(), range, 200)
                    .await?;
                Ok(traces
                    .into_iter()
                    .map(|t| Record {
                        timestamp: t.spans.first().map(|s| s.start).unwrap_or(range.start),
                        engine: QEngine::Traces,
                        labels: Default::default(),
                        value: serde_json::to_value(&t).unwrap_or(serde_json::Value::Null),
                    })
                    .collect())
            }
        }
    }

    async fn execute_single(&self, query: &UnifiedQuery, engine: QEngine) -> Result<UnifiedResult, CoreError> {
        let range = self.resolve_time_range(query)?;
        let timeout = self.sub_query_timeout(query);

        let outcome = tokio::time::timeout(timeout, self.run_one(engine, &query.query, range)).await;
        let (status, records, error) = match outcome {
            Ok(Ok(records)) => (ResultStatus::Success, records, None),
            Ok(Err(e)) => {
                tracing::error!("{engine:?} query failed: {e}");
                (ResultStatus::Error, vec![], Some(e.to_string()))
            }
            Err(_) => {
                tracing::warn!("{engine:?} query timed out after {}ms", timeout.as_millis());
                (
                    ResultStatus::Timeout,
                    vec![],
                    Some(format!("{engine:?} timed out after {}ms", timeout.as_millis())),
                )
            }
        };

        let mut engine_results = std::collections::BTreeMap::new();
        engine_results.insert(format!("{engine:?}").to_lowercase(), status);

        Ok(UnifiedResult {
            query_id: query.id.clone(),
            status,
            records,
            correlation_summary: None,
            metadata: ResultMetadata {
                engine_results,
                warnings: error.into_iter().collect(),
            },
        })
    }

    async fn execute_correlation(&self, query: &UnifiedQuery) -> Result<UnifiedResult, CoreError> {
        let parsed = query_lang::parse_correlation(&query.query)?;
        let range = self.resolve_time_range(query)?;
        let timeout = self.sub_query_timeout(query);

        let futures = parsed.expressions.iter().map(|expr| self.run_expression(expr, range, timeout));
        let outcomes = join_all(futures).await;

        let mut groups = Vec::with_capacity(outcomes.len());
        let mut per_engine_status = std::collections::BTreeMap::new();
        let mut warnings = Vec::new();
        let mut any_success = false;
        let mut any_failure = false;

        for (expr, outcome) in parsed.expressions.iter().zip(outcomes.into_iter()) {
            let name = format!("{:?}", expr.engine).to_lowercase();
            match outcome {
                Ok(records) => {
                    any_success = true;
                    per_engine_status.insert(name, ResultStatus::Success);
                    groups.push(records);
                }
                Err(e) => {
                    any_failure = true;
                    tracing::warn!("correlation sub-expression on {name} failed: {e}");
                    per_engine_status.insert(name, ResultStatus::Error);
                    warnings.push(e.to_string());
                    groups.push(vec![]);
                }
            }
        }

        let (records, summary) = join::join(
            &groups,
            parsed.operator,
            &query.correlation_options.correlation_keys,
            parsed.time_window,
        );

        let status = match (any_success, any_failure) {
            (true, true) => ResultStatus::Partial,
            (true, false) => ResultStatus::Success,
            (false, _) => ResultStatus::Error,
        };

        Ok(UnifiedResult {
            query_id: query.id.clone(),
            status,
            records,
            correlation_summary: Some(summary),
            metadata: ResultMetadata {
                engine_results: per_engine_status,
                warnings,
            },
        })
    }

    async fn run_expression(
        &self,
        expr: &CorrelationExpression,
        range: TimeRange,
        timeout: Duration,
    ) -> Result<Vec<Record>, CoreError> {
        let query_text = format!("{}{}", expr.query, expr.condition);
        match tokio::time::timeout(timeout, self.run_one(expr.engine, &query_text, range)).await {
            Ok(inner) => inner,
            Err(_) => Err(CoreError::BackendTimeout {
                engine: format!("{:?}", expr.engine).to_lowercase(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn default_range(&self) -> Result<TimeRange, CoreError> {
        let end = Utc::now();
        TimeRange::new(end - chrono::Duration::seconds(DEFAULT_WINDOW_SECS), end)
    }

    async fn run_one_timed(&self, engine: QEngine, query_text: &str, range: TimeRange, timeout: Duration) -> Result<Vec<Record>, CoreError> {
        match tokio::time::timeout(timeout, self.run_one(engine, query_text, range)).await {
            Ok(inner) => inner,
            Err(_) => Err(CoreError::BackendTimeout {
                engine: format!("{engine:?}").to_lowercase(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Recursive evaluator for a UQL `Correlation` expression's `left`/`right`
    /// operands (§4.3.2): a `DataSource` runs directly, a `Subquery` runs its
    /// inner source, and nested `Correlation`s join their own children first.
    /// Boxed because `async fn` can't recurse without it.
    fn eval_uql_expr<'a>(
        &'a self,
        expr: &'a UqlExpression,
        range: TimeRange,
        timeout: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Record>, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            match expr {
                UqlExpression::DataSource(ds) => self.run_one_timed(ds.engine, &ds.query, range, timeout).await,
                UqlExpression::Subquery(s) => self.run_one_timed(s.source.engine, &s.source.query, range, timeout).await,
                UqlExpression::Correlation(c) => {
                    let (left, right) = tokio::try_join!(
                        self.eval_uql_expr(&c.left, range, timeout),
                        self.eval_uql_expr(&c.right, range, timeout),
                    )?;
                    let (records, _) = uql::join_uql(left, right, c.operator, c.window);
                    Ok(records)
                }
            }
        })
    }

    /// Executes a parsed UQL query (§4.3.2's Select/Correlation/Aggregation/Join
    /// shapes) against the backends, the richer-language counterpart to
    /// [`Self::execute`]'s correlation-DSL path.
    pub async fn execute_uql(&self, query: &UqlQuery) -> Result<UnifiedResult, CoreError> {
        query.validate()?;
        let range = self.default_range()?;
        let timeout = Duration::from_secs(self.config.sub_query_timeout_secs);
        let query_id = Uuid::new_v4().to_string();

        let (records, correlation_summary, engine_results) = match query {
            UqlQuery::Select(select) => {
                let mut records = self.run_one_timed(select.from.engine, &select.from.query, range, timeout).await?;
                if let Some(cond) = &select.condition {
                    records.retain(|r| uql::clause_matches(r, cond));
                }
                records.sort_by_key(|r| r.timestamp);
                if let Some(limit) = select.limit {
                    records.truncate(limit as usize);
                }
                let mut engine_results = std::collections::BTreeMap::new();
                engine_results.insert(format!("{:?}", select.from.engine).to_lowercase(), ResultStatus::Success);
                (records, None, engine_results)
            }
            UqlQuery::Aggregation(agg) => {
                let mut records = self.run_one_timed(agg.from.engine, &agg.from.query, range, timeout).await?;
                if let Some(cond) = &agg.condition {
                    records.retain(|r| uql::clause_matches(r, cond));
                }
                let mut groups: std::collections::BTreeMap<std::collections::BTreeMap<String, String>, Vec<Record>> =
                    std::collections::BTreeMap::new();
                for record in records.drain(..) {
                    groups.entry(uql::group_key(&record, &agg.group_by)).or_default().push(record);
                }
                let out_records = groups
                    .into_iter()
                    .map(|(key, group)| Record {
                        timestamp: group.iter().map(|r| r.timestamp).max().unwrap_or(range.end),
                        engine: agg.from.engine,
                        labels: key,
                        value: serde_json::json!(uql::aggregate(agg.func, agg.field.as_deref(), &group)),
                    })
                    .collect();
                let mut engine_results = std::collections::BTreeMap::new();
                engine_results.insert(format!("{:?}", agg.from.engine).to_lowercase(), ResultStatus::Success);
                (out_records, None, engine_results)
            }
            UqlQuery::Join(j) => {
                let (left, right) = tokio::try_join!(
                    self.run_one_timed(j.left.engine, &j.left.query, range, timeout),
                    self.run_one_timed(j.right.engine, &j.right.query, range, timeout),
                )?;
                let mut matched = Vec::new();
                let mut confidences = Vec::new();
                for l in &left {
                    for r in &right {
                        if !uql::clause_matches_pair(l, r, &j.on) {
                            continue;
                        }
                        let confidence = match j.window {
                            Some(w) => {
                                let delta_ms = (l.timestamp - r.timestamp).num_milliseconds().unsigned_abs();
                                if delta_ms as u128 > w.as_millis() {
                                    continue;
                                }
                                1.0 - (delta_ms as f64 / w.as_millis().max(1) as f64)
                            }
                            None => 1.0,
                        };
                        matched.push(l.clone());
                        matched.push(r.clone());
                        confidences.push(confidence);
                    }
                }
                let matched_pairs = confidences.len();
                let average_confidence = if matched_pairs == 0 {
                    0.0
                } else {
                    confidences.iter().sum::<f64>() / matched_pairs as f64
                };
                let mut engine_results = std::collections::BTreeMap::new();
                engine_results.insert(format!("{:?}", j.left.engine).to_lowercase(), ResultStatus::Success);
                engine_results.insert(format!("{:?}", j.right.engine).to_lowercase(), ResultStatus::Success);
                (matched, Some(CorrelationSummary { matched_pairs, average_confidence }), engine_results)
            }
            UqlQuery::Correlation(c) => {
                let (left, right) = tokio::try_join!(self.eval_uql_expr(&c.left, range, timeout), self.eval_uql_expr(&c.right, range, timeout))?;
                let (records, summary) = uql::join_uql(left, right, c.operator, c.window);
                let mut engine_results = std::collections::BTreeMap::new();
                engine_results.insert("correlation".to_string(), ResultStatus::Success);
                (records, Some(summary), engine_results)
            }
        };

        Ok(UnifiedResult {
            query_id,
            status: ResultStatus::Success,
            records,
            correlation_summary,
            metadata: ResultMetadata { engine_results, warnings: vec![] },
        })
    }
}

fn prom_response_to_records(resp: crate::backend::PromResponse) -> Vec<Record> {
    let series = match resp.data {
        Some(PromData::Vector(s)) | Some(PromData::Matrix(s)) => s,
        Some(PromData::Scalar(sample)) => {
            return vec![Record {
                timestamp: sample.timestamp,
                engine: QEngine::Metrics,
                labels: Default::default(),
                value: serde_json::json!(sample.value),
            }];
        }
        None => vec![],
    };
    series
        .into_iter()
        .flat_map(|s| {
            let labels = s.labels.clone();
            s.samples.into_iter().map(move |sample| Record {
                timestamp: sample.timestamp,
                engine: QEngine::Metrics,
                labels: labels.clone(),
                value: serde_json::json!(sample.value),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockLogsClient, MockMetricsClient, MockTracesClient};
    use crate::backend::{LogRow, Sample, Series};
    use crate::models::unified_query::{CacheOptions, CorrelationOptions};
    use chrono::Utc;
    use std::collections::BTreeMap as Map;

    fn engine_with_mocks(metrics: MockMetricsClient, logs: MockLogsClient, traces: MockTracesClient) -> UnifiedQueryEngine {
        UnifiedQueryEngine::new(Arc::new(metrics), Arc::new(logs), Arc::new(traces), EngineConfig::default())
    }

    fn base_query(query_type: QueryType, text: &str) -> UnifiedQuery {
        UnifiedQuery {
            id: "q1".into(),
            query_type,
            query: text.into(),
            start: None,
            end: None,
            timeout: None,
            parameters: Map::new(),
            correlation_options: CorrelationOptions::default(),
            cache_options: CacheOptions::default(),
        }
    }

    #[tokio::test]
    async fn single_metrics_query_succeeds() {
        let now = Utc::now();
        let metrics = MockMetricsClient::new().with_series(
            "up",
            vec![Series {
                labels: Map::new(),
                samples: vec![Sample { timestamp: now, value: 1.0 }],
            }],
        );
        let engine = engine_with_mocks(metrics, MockLogsClient::new(), MockTracesClient::new());
        let result = engine.execute(&base_query(QueryType::Metrics, "up")).await.unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_error_status() {
        let metrics = MockMetricsClient::new().failing(CoreError::BackendUnavailable {
            engine: "metrics".into(),
            message: "down".into(),
        });
        let engine = engine_with_mocks(metrics, MockLogsClient::new(), MockTracesClient::new());
        let result = engine.execute(&base_query(QueryType::Metrics, "up")).await.unwrap();
        assert_eq!(result.status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn correlation_query_fans_out_and_joins() {
        let now = Utc::now();
        let logs = MockLogsClient::new().with_rows(vec![LogRow {
            timestamp: now,
            fields: Map::from([("service".to_string(), serde_json::json!("checkout"))]),
        }]);
        let metrics = MockMetricsClient::new().with_series(
            "cpu_usage",
            vec![Series {
                labels: Map::from([("service".to_string(), "checkout".to_string())]),
                samples: vec![Sample { timestamp: now, value: 91.0 }],
            }],
        );
        let engine = engine_with_mocks(metrics, logs, MockTracesClient::new());
        let mut query = base_query(QueryType::Correlation, "logs:error WITHIN 5m OF metrics:cpu_usage > 80");
        query.correlation_options.correlation_keys = vec!["service".to_string()];
        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        let summary = result.correlation_summary.unwrap();
        assert_eq!(summary.matched_pairs, 1);
    }

    #[tokio::test]
    async fn error_result_is_not_cached() {
        let metrics = Arc::new(MockMetricsClient::new().failing(CoreError::BackendUnavailable {
            engine: "metrics".into(),
            message: "down".into(),
        }));
        let engine = UnifiedQueryEngine::new(
            metrics.clone(),
            Arc::new(MockLogsClient::new()),
            Arc::new(MockTracesClient::new()),
            EngineConfig::default(),
        );
        let query = base_query(QueryType::Metrics, "up");
        let first = engine.execute(&query).await.unwrap();
        assert_eq!(first.status, ResultStatus::Error);

        // The backend recovers; a cached error must not mask that recovery.
        *metrics.fail.lock().unwrap() = None;
        let second = engine.execute(&query).await.unwrap();
        assert_eq!(second.status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn cache_hit_skips_backend_entirely() {
        let metrics = MockMetricsClient::new().with_series(
            "up",
            vec![Series {
                labels: Map::new(),
                samples: vec![Sample { timestamp: Utc::now(), value: 1.0 }],
            }],
        );
        let engine = engine_with_mocks(metrics, MockLogsClient::new(), MockTracesClient::new());
        let query = base_query(QueryType::Metrics, "up");
        let first = engine.execute(&query).await.unwrap();
        let second = engine.execute(&query).await.unwrap();
        assert_eq!(first.records.len(), second.records.len());
    }

    #[tokio::test]
    async fn uql_select_filters_sorts_and_limits() {
        let logs = MockLogsClient::new().with_rows(vec![
            LogRow {
                timestamp: Utc::now(),
                fields: Map::from([("status".to_string(), serde_json::json!("error"))]),
            },
            LogRow {
                timestamp: Utc::now(),
                fields: Map::from([("status".to_string(), serde_json::json!("ok"))]),
            },
        ]);
        let engine = engine_with_mocks(MockMetricsClient::new(), logs, MockTracesClient::new());
        let query = crate::query_lang::parse_uql("SELECT status FROM logs:error WHERE status = \"error\"").unwrap();
        let result = engine.execute_uql(&query).await.unwrap();
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn uql_aggregation_groups_and_counts() {
        let logs = MockLogsClient::new().with_rows(vec![
            LogRow {
                timestamp: Utc::now(),
                fields: Map::from([("service".to_string(), serde_json::json!("checkout"))]),
            },
            LogRow {
                timestamp: Utc::now(),
                fields: Map::from([("service".to_string(), serde_json::json!("checkout"))]),
            },
        ]);
        let engine = engine_with_mocks(MockMetricsClient::new(), logs, MockTracesClient::new());
        let query = crate::query_lang::parse_uql("COUNT() FROM logs:error GROUP BY service").unwrap();
        let result = engine.execute_uql(&query).await.unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].value, serde_json::json!(2.0));
    }

    #[tokio::test]
    async fn uql_correlation_before_matches_ordered_pairs() {
        let now = Utc::now();
        let logs = MockLogsClient::new().with_rows(vec![LogRow {
            timestamp: now,
            fields: Map::new(),
        }]);
        let traces = MockTracesClient::new();
        let engine = engine_with_mocks(MockMetricsClient::new(), logs, traces);
        let query = crate::query_lang::parse_uql("logs:error BEFORE 5m traces:slow").unwrap();
        let result = engine.execute_uql(&query).await.unwrap();
        assert!(result.correlation_summary.is_some());
    }
}

//! Fixed-data backend implementations for engine/RCA tests — no I/O, deterministic
//! output, matching the teacher's habit of feeding `anomaly_engine`'s EWMA
//! evaluator a literal `PromResponse` rather than standing up a real Prometheus.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use super::*;
use crate::error::CoreError;
use crate::time_range::TimeRange;

#[derive(Default)]
pub struct MockMetricsClient {
    pub series: Mutex<BTreeMap<String, Vec<Series>>>,
    pub fail: Mutex<Option<CoreError>>,
}

impl MockMetricsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(self, query: &str, series: Vec<Series>) -> Self {
        self.series.lock().unwrap().insert(query.to_string(), series);
        self
    }

    pub fn failing(self, err: CoreError) -> Self {
        *self.fail.lock().unwrap() = Some(err);
        self
    }
}

#[async_trait]
impl MetricsClient for MockMetricsClient {
    async fn instant_query(&self, query: &str, at: DateTime<Utc>) -> Result<PromResponse, CoreError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        let series = self
            .series
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        let vector: Vec<Series> = series
            .into_iter()
            .map(|mut s| {
                if let Some(last) = s.samples.last().cloned() {
                    s.samples = vec![Sample {
                        timestamp: at,
                        value: last.value,
                    }];
                }
                s
            })
            .collect();
        Ok(PromResponse {
            status: PromStatus::Success,
            data: Some(PromData::Vector(vector)),
        })
    }

    async fn range_query(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _step: Duration,
    ) -> Result<PromResponse, CoreError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        let series = self
            .series
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        let filtered: Vec<Series> = series
            .into_iter()
            .map(|mut s| {
                s.samples.retain(|p| p.timestamp >= start && p.timestamp <= end);
                s
            })
            .collect();
        Ok(PromResponse {
            status: PromStatus::Success,
            data: Some(PromData::Matrix(filtered)),
        })
    }

    async fn series(&self, match_selector: &str) -> Result<Vec<BTreeMap<String, String>>, CoreError> {
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(match_selector)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.labels)
            .collect())
    }

    async fn labels(&self, _match_selector: &str) -> Result<Vec<String>, CoreError> {
        Ok(vec![])
    }

    async fn label_values(&self, _label: &str, _match_selector: &str) -> Result<Vec<String>, CoreError> {
        Ok(vec![])
    }
}

#[derive(Default)]
pub struct MockLogsClient {
    pub rows: Mutex<Vec<LogRow>>,
    pub fail: Mutex<Option<CoreError>>,
}

impl MockLogsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: Vec<LogRow>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    pub fn failing(self, err: CoreError) -> Self {
        *self.fail.lock().unwrap() = Some(err);
        self
    }
}

#[async_trait]
impl LogsClient for MockLogsClient {
    async fn search(
        &self,
        _query: &str,
        time_range: TimeRange,
        limit: u64,
        _page_cursor: Option<PageCursor>,
    ) -> Result<LogSearchResult, CoreError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        let rows: Vec<LogRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| time_range.contains(r.timestamp))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(LogSearchResult {
            rows,
            next_cursor: None,
        })
    }

    async fn histogram(
        &self,
        _query: &str,
        _time_range: TimeRange,
        _step: Duration,
        _sampling: Option<f64>,
    ) -> Result<Vec<HistogramBucket>, CoreError> {
        Ok(vec![])
    }

    async fn facets(
        &self,
        _query: &str,
        _fields: &[String],
        _limit: u64,
        _sampling: Option<f64>,
    ) -> Result<Vec<FieldFacets>, CoreError> {
        Ok(vec![])
    }

    async fn export(&self, _query: &str, _format: &str) -> Result<Vec<u8>, CoreError> {
        Ok(vec![])
    }
}

#[derive(Default)]
pub struct MockTracesClient {
    pub traces: Mutex<Vec<Trace>>,
    pub fail: Mutex<Option<CoreError>>,
}

impl MockTracesClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_traces(self, traces: Vec<Trace>) -> Self {
        *self.traces.lock().unwrap() = traces;
        self
    }
}

#[async_trait]
impl TracesClient for MockTracesClient {
    async fn search_traces(
        &self,
        filters: &TraceFilters,
        _time_range: TimeRange,
        limit: u64,
    ) -> Result<Vec<Trace>, CoreError> {
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        let traces = self.traces.lock().unwrap();
        let filtered: Vec<Trace> = traces
            .iter()
            .filter(|t| match &filters.service {
                Some(svc) => t.spans.iter().any(|s| &s.service == svc),
                None => true,
            })
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, CoreError> {
        Ok(self
            .traces
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.trace_id == trace_id)
            .cloned())
    }
}

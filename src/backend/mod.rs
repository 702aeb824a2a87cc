//! Narrow capability interfaces for the three telemetry backends (§4.2). The rest
//! of the core treats concrete transports as black boxes behind these traits —
//! the teacher's `AppState` held a concrete `clickhouse::Client`; here we hold
//! `Arc<dyn MetricsClient>` etc. so the engine and RCA pipeline never know whether
//! they're talking to a real backend or the in-memory mocks in [`mock`].

pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum PromData {
    Vector(Vec<Series>),
    Matrix(Vec<Series>),
    Scalar(Sample),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromResponse {
    pub status: PromStatus,
    pub data: Option<PromData>,
}

#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn instant_query(&self, query: &str, at: DateTime<Utc>) -> Result<PromResponse, CoreError>;
    async fn range_query(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<PromResponse, CoreError>;
    async fn series(&self, match_selector: &str) -> Result<Vec<BTreeMap<String, String>>, CoreError>;
    async fn labels(&self, match_selector: &str) -> Result<Vec<String>, CoreError>;
    async fn label_values(&self, label: &str, match_selector: &str) -> Result<Vec<String>, CoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub timestamp: DateTime<Utc>,
    pub offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchResult {
    pub rows: Vec<LogRow>,
    pub next_cursor: Option<PageCursor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetBucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFacets {
    pub field: String,
    pub buckets: Vec<FacetBucket>,
}

#[async_trait]
pub trait LogsClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        time_range: crate::time_range::TimeRange,
        limit: u64,
        page_cursor: Option<PageCursor>,
    ) -> Result<LogSearchResult, CoreError>;

    async fn histogram(
        &self,
        query: &str,
        time_range: crate::time_range::TimeRange,
        step: Duration,
        sampling: Option<f64>,
    ) -> Result<Vec<HistogramBucket>, CoreError>;

    async fn facets(
        &self,
        query: &str,
        fields: &[String],
        limit: u64,
        sampling: Option<f64>,
    ) -> Result<Vec<FieldFacets>, CoreError>;

    async fn export(&self, query: &str, format: &str) -> Result<Vec<u8>, CoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceFilters {
    pub service: Option<String>,
    pub operation: Option<String>,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub since: Option<Duration>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub status_error: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<TraceSpan>,
}

#[async_trait]
pub trait TracesClient: Send + Sync {
    async fn search_traces(
        &self,
        filters: &TraceFilters,
        time_range: crate::time_range::TimeRange,
        limit: u64,
    ) -> Result<Vec<Trace>, CoreError>;

    async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, CoreError>;
}

//! `UnifiedResult` and the per-engine sub-results the engine assembles it from
//! (§4.4). Owned by the caller of [`crate::engine::UnifiedQueryEngine`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::correlation::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Partial,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub engine: Engine,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine: Engine,
    pub status: ResultStatus,
    pub records: Vec<Record>,
    pub execution_time_ms: u64,
    pub record_count: usize,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub matched_pairs: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub engine_results: BTreeMap<String, ResultStatus>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedResult {
    pub query_id: String,
    pub status: ResultStatus,
    pub records: Vec<Record>,
    pub correlation_summary: Option<CorrelationSummary>,
    pub metadata: ResultMetadata,
}

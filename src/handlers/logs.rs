//! Log search/histogram/facet endpoints (§4.2, §6), a thin wrapper over
//! `LogsClient` the same way `handlers::metrics` wraps `MetricsClient`.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::AppState;
use crate::backend::{FieldFacets, HistogramBucket, LogSearchResult, PageCursor};
use crate::error::CoreError;
use crate::time_range::TimeRange;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub cursor: Option<PageCursor>,
}

fn default_limit() -> u64 {
    1000
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<LogSearchResult>, CoreError> {
    let range = TimeRange::new(req.start, req.end)?;
    let result = state.logs.search(&req.query, range, req.limit, req.cursor).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct HistogramRequest {
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
    #[serde(default)]
    pub sampling: Option<f64>,
}

fn default_step_secs() -> u64 {
    60
}

pub async fn histogram(
    State(state): State<AppState>,
    Json(req): Json<HistogramRequest>,
) -> Result<Json<Vec<HistogramBucket>>, CoreError> {
    let range = TimeRange::new(req.start, req.end)?;
    let buckets = state
        .logs
        .histogram(&req.query, range, Duration::from_secs(req.step_secs), req.sampling)
        .await?;
    Ok(Json(buckets))
}

#[derive(Debug, Deserialize)]
pub struct FacetsRequest {
    pub query: String,
    pub fields: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub sampling: Option<f64>,
}

pub async fn facets(
    State(state): State<AppState>,
    Json(req): Json<FacetsRequest>,
) -> Result<Json<Vec<FieldFacets>>, CoreError> {
    let facets = state.logs.facets(&req.query, &req.fields, req.limit, req.sampling).await?;
    Ok(Json(facets))
}

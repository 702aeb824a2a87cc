//! Prometheus-style pass-through endpoints (§4.2, §6) — a thin `Json` wrapper
//! over `MetricsClient`, mirroring the teacher's `prom_query`/`prom_query_range`
//! shape without the PromQL-string parsing (the unified engine owns query
//! parsing; these exist for direct metrics access).

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::AppState;
use crate::backend::PromResponse;
use crate::error::CoreError;

#[derive(Debug, Deserialize)]
pub struct InstantQueryRequest {
    pub query: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

pub async fn instant_query(
    State(state): State<AppState>,
    Json(req): Json<InstantQueryRequest>,
) -> Result<Json<PromResponse>, CoreError> {
    let resp = state.metrics.instant_query(&req.query, req.time).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct RangeQueryRequest {
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
}

fn default_step_secs() -> u64 {
    15
}

pub async fn range_query(
    State(state): State<AppState>,
    Json(req): Json<RangeQueryRequest>,
) -> Result<Json<PromResponse>, CoreError> {
    let resp = state
        .metrics
        .range_query(&req.query, req.start, req.end, Duration::from_secs(req.step_secs))
        .await?;
    Ok(Json(resp))
}

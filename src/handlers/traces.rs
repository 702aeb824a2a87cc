//! Trace search endpoint (§4.2, §6), a thin wrapper over `TracesClient`.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::AppState;
use crate::backend::{Trace, TraceFilters};
use crate::error::CoreError;
use crate::time_range::TimeRange;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub filters: TraceFilters,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    200
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<Trace>>, CoreError> {
    let range = TimeRange::new(req.start, req.end)?;
    let traces = state.traces.search_traces(&req.filters, range, req.limit).await?;
    Ok(Json(traces))
}

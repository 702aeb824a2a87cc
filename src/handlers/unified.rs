//! The Unified Query Engine's HTTP face (§4.4, §6): `/unified/query` dispatches
//! whatever `query_type` the body carries, `/unified/correlate` is a thin
//! convenience that forces it to `Correlation` so callers don't have to repeat
//! the field, and `/unified/uql` runs the richer UQL grammar of §4.3.2.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::error::CoreError;
use crate::models::result::UnifiedResult;
use crate::models::unified_query::{QueryType, UnifiedQuery};
use crate::query_lang;

pub async fn query(
    State(state): State<AppState>,
    Json(query): Json<UnifiedQuery>,
) -> Result<Json<UnifiedResult>, CoreError> {
    let result = state.engine.execute(&query).await?;
    Ok(Json(result))
}

pub async fn correlate(
    State(state): State<AppState>,
    Json(mut query): Json<UnifiedQuery>,
) -> Result<Json<UnifiedResult>, CoreError> {
    query.query_type = QueryType::Correlation;
    let result = state.engine.execute(&query).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct UqlRequest {
    pub query: String,
}

pub async fn uql(
    State(state): State<AppState>,
    Json(req): Json<UqlRequest>,
) -> Result<Json<UnifiedResult>, CoreError> {
    let parsed = query_lang::parse_uql(&req.query)?;
    let result = state.engine.execute_uql(&parsed).await?;
    Ok(Json(result))
}

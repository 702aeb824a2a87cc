//! `GET /servicegraph` (§4.5, §6).

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::AppState;
use crate::error::CoreError;
use crate::models::service_graph::{ServiceGraphData, ServiceGraphWindow};
use crate::time_range::TimeRange;

#[derive(Debug, Deserialize)]
pub struct ServiceGraphParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub client: Option<String>,
    pub server: Option<String>,
    pub connection_type: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    Query(params): Query<ServiceGraphParams>,
) -> Result<Json<ServiceGraphData>, CoreError> {
    let window = ServiceGraphWindow {
        range: TimeRange::new(params.start, params.end)?,
        client: params.client,
        server: params.server,
        connection_type: params.connection_type,
    };
    let data = state.service_graph.build(window).await?;
    Ok(Json(data))
}

//! RCA endpoints (§4.6, §6): `/unified/rca` runs the pipeline and returns the
//! incident; `/rca/store` runs it and persists the result to the registry for
//! later retrieval, the way the teacher's alert/SLO handlers persist computed
//! state rather than just returning it.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::error::CoreError;
use crate::models::kpi::KpiDefinition;
use crate::models::rca::{RcaIncident, RcaRequest};
use crate::models::service_graph::ServiceGraphWindow;
use crate::time_range::TimeRange;

async fn resolve_impact(
    state: &AppState,
    request: &RcaRequest,
) -> Result<(String, Option<crate::models::kpi::Sentiment>), CoreError> {
    if let Some(service) = &request.impact_service {
        return Ok((service.clone(), None));
    }
    let kpi_id = request
        .impact_kpi_id
        .as_ref()
        .ok_or_else(|| CoreError::validation("impact_service", "RCA request needs impact_service or impact_kpi_id"))?;
    let stored = state.registry.get_by_id("KpiDefinition", kpi_id).await?;
    let def: KpiDefinition = serde_json::from_value(Value::Object(stored.properties.into_iter().collect()))
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    let service = def
        .query
        .labels
        .get("service")
        .cloned()
        .ok_or_else(|| CoreError::validation("impact_kpi_id", "KPI has no `service` label to resolve an impact service from"))?;
    Ok((service, Some(def.sentiment)))
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<RcaRequest>,
) -> Result<Json<RcaIncident>, CoreError> {
    request.validate()?;
    let (impact_service, sentiment) = resolve_impact(&state, &request).await?;
    let window = ServiceGraphWindow {
        range: TimeRange::new(request.time_start, request.time_end)?,
        client: None,
        server: None,
        connection_type: None,
    };
    let graph = state.service_graph.build(window).await?;
    let incident = state.rca.analyze(&request, &impact_service, &graph, sentiment).await?;
    Ok(Json(incident))
}

#[derive(Debug, Serialize)]
pub struct StoredIncident {
    pub id: String,
    pub incident: RcaIncident,
}

pub async fn store(
    State(state): State<AppState>,
    Json(request): Json<RcaRequest>,
) -> Result<Json<StoredIncident>, CoreError> {
    request.validate()?;
    let (impact_service, sentiment) = resolve_impact(&state, &request).await?;
    let window = ServiceGraphWindow {
        range: TimeRange::new(request.time_start, request.time_end)?,
        client: None,
        server: None,
        connection_type: None,
    };
    let graph = state.service_graph.build(window).await?;
    let incident = state.rca.analyze(&request, &impact_service, &graph, sentiment).await?;

    let id = Uuid::new_v4().to_string();
    let properties = match serde_json::to_value(&incident).map_err(|e| CoreError::Internal(e.to_string()))? {
        Value::Object(map) => map.into_iter().collect(),
        _ => unreachable!("RcaIncident always serializes to a JSON object"),
    };
    state.registry.ensure_at_id("RcaIncident", &id, properties).await?;

    Ok(Json(StoredIncident { id, incident }))
}

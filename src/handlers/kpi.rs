//! KPI definition CRUD on top of the Registry (§3, §4.1, §6). Mirrors the
//! teacher's `handlers::dashboards` upsert-then-relist shape, generalized onto
//! the generic `Registry<S>` instead of direct SQL.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::AppState;
use crate::error::CoreError;
use crate::models::kpi::KpiDefinition;
use crate::registry::Filter;

const CLASS: &str = "KpiDefinition";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<KpiDefinition>>, CoreError> {
    let stored = state.registry.list(CLASS, &Filter::default(), params.limit, params.offset).await?;
    let defs = stored
        .into_iter()
        .filter_map(|obj| serde_json::from_value(Value::Object(obj.properties.into_iter().collect())).ok())
        .collect();
    Ok(Json(defs))
}

pub async fn upsert(
    State(state): State<AppState>,
    Json(def): Json<KpiDefinition>,
) -> Result<Json<KpiDefinition>, CoreError> {
    def.validate()?;
    let properties = match serde_json::to_value(&def).map_err(|e| CoreError::Internal(e.to_string()))? {
        Value::Object(map) => map.into_iter().collect(),
        _ => unreachable!("KpiDefinition always serializes to a JSON object"),
    };
    state.registry.ensure_at_id(CLASS, &def.id, properties).await?;
    Ok(Json(def))
}

pub async fn get(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<KpiDefinition>, CoreError> {
    let obj = state.registry.get_by_id(CLASS, &id).await?;
    let def = serde_json::from_value(Value::Object(obj.properties.into_iter().collect()))
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(Json(def))
}

//! HTTP surface (§6), wired the way the teacher's `handlers/` tree wires axum:
//! one file per concern, a shared `AppState`, `IntoResponse` doing the
//! `CoreError` → status-code mapping `error::http_status` already describes.

pub mod kpi;
pub mod logs;
pub mod metrics;
pub mod rca;
pub mod servicegraph;
pub mod traces;
pub mod unified;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::backend::{LogsClient, MetricsClient, TracesClient};
use crate::engine::UnifiedQueryEngine;
use crate::error::CoreError;
use crate::rca::RcaEngine;
use crate::registry::{Registry, SqliteObjectStore};
use crate::service_graph::ServiceGraphBuilder;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<UnifiedQueryEngine>,
    pub metrics: Arc<dyn MetricsClient>,
    pub logs: Arc<dyn LogsClient>,
    pub traces: Arc<dyn TracesClient>,
    pub service_graph: Arc<ServiceGraphBuilder>,
    pub rca: Arc<RcaEngine>,
    pub registry: Arc<Registry<SqliteObjectStore>>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `GET /healthz`: reports the registry's backing object store readiness
/// rather than a fixed "ok", mirroring the status probes the backend clients
/// themselves expose.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.registry.is_ready().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "reason": "registry object store is not ready" })),
        )
    }
}

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mirador_core::backend::mock::{MockLogsClient, MockMetricsClient, MockTracesClient};
use mirador_core::config::CoreConfig;
use mirador_core::engine::UnifiedQueryEngine;
use mirador_core::handlers::{self, AppState};
use mirador_core::rca::anomaly::EwmaAnomalyScorer;
use mirador_core::rca::RcaEngine;
use mirador_core::registry::seed::{ensure_telemetry_standards, EngineConfigSeed};
use mirador_core::registry::{Registry, SqliteObjectStore};
use mirador_core::service_graph::ServiceGraphBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mirador_core=debug,tower_http=debug")))
        .init();

    let config_path = std::env::var("MIRADOR_CONFIG").unwrap_or_else(|_| "./mirador.toml".to_string());
    let config = CoreConfig::load(&config_path)?;
    tracing::info!(path = %config_path, "config loaded");

    let registry_db_path = std::env::var("MIRADOR_REGISTRY_DB").unwrap_or_else(|_| "./mirador_registry.db".to_string());
    let store = SqliteObjectStore::open(&registry_db_path)?;
    let registry = Arc::new(Registry::new(store, config.registry.readiness_ttl_secs));
    tracing::info!(path = %registry_db_path, "registry opened");

    ensure_telemetry_standards(&*registry, &EngineConfigSeed::default()).await?;

    // Real metrics/logs/traces transports are an external-collaborator
    // non-goal (§1); these in-memory clients let the gateway boot and serve
    // the unified/RCA/service-graph surface against seeded or injected data.
    let metrics = Arc::new(MockMetricsClient::new());
    let logs = Arc::new(MockLogsClient::new());
    let traces = Arc::new(MockTracesClient::new());

    let engine = Arc::new(UnifiedQueryEngine::new(metrics.clone(), logs.clone(), traces.clone(), config.engine.clone()));
    let service_graph = Arc::new(ServiceGraphBuilder::new(metrics.clone()));
    let rca = Arc::new(RcaEngine::new(metrics.clone(), Arc::new(EwmaAnomalyScorer::default()), config.rca.clone()));

    let state = AppState {
        engine,
        metrics,
        logs,
        traces,
        service_graph,
        rca,
        registry,
    };

    let app = Router::new()
        .route("/api/v1/metrics/query", post(handlers::metrics::instant_query))
        .route("/api/v1/metrics/query_range", post(handlers::metrics::range_query))
        .route("/api/v1/logs/query", post(handlers::logs::search))
        .route("/api/v1/logs/histogram", post(handlers::logs::histogram))
        .route("/api/v1/logs/facets", post(handlers::logs::facets))
        .route("/api/v1/traces/search", post(handlers::traces::search))
        .route("/api/v1/unified/query", post(handlers::unified::query))
        .route("/api/v1/unified/correlate", post(handlers::unified::correlate))
        .route("/api/v1/unified/uql", post(handlers::unified::uql))
        .route("/api/v1/unified/rca", post(handlers::rca::analyze))
        .route("/api/v1/rca/store", post(handlers::rca::store))
        .route(
            "/api/v1/kpi/defs",
            get(handlers::kpi::list).post(handlers::kpi::upsert),
        )
        .route("/api/v1/kpi/defs/{id}", get(handlers::kpi::get))
        .route("/api/v1/servicegraph", get(handlers::servicegraph::get))
        .route("/healthz", get(handlers::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "mirador-core listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

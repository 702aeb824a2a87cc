//! `EnsureTelemetryStandards` — seeds the platform's mandatory labels, metric
//! families, and service/operation records (§4.1). Idempotent across repeated
//! runs because it rides on `Registry::ensure`'s name-hashed identity.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{ObjectStore, Registry};
use crate::error::CoreError;
use crate::models::definitions::{Definition, Service, SignalType};

/// The canonical labels every span/metric is expected to carry; RCA's
/// diagnostics (§4.6.4) flags their absence.
pub const CANONICAL_LABELS: &[&str] = &["service_name", "span_kind", "trace_id"];

pub struct EngineConfigSeed {
    pub metric_families: Vec<&'static str>,
    pub services: Vec<&'static str>,
}

impl Default for EngineConfigSeed {
    fn default() -> Self {
        Self {
            metric_families: vec![
                "traces_service_graph_request_total",
                "traces_service_graph_request_failed_total",
                "traces_service_graph_request_server_seconds",
                "traces_service_graph_request_client_seconds",
                "traces_service_graph_unpaired_spans_total",
                "traces_service_graph_dropped_spans_total",
            ],
            services: vec![],
        }
    }
}

pub async fn ensure_telemetry_standards<S: ObjectStore>(
    registry: &Registry<S>,
    seed: &EngineConfigSeed,
) -> Result<(), CoreError> {
    for label in CANONICAL_LABELS {
        let props: BTreeMap<String, Value> = BTreeMap::from([
            ("name".to_string(), json!(label)),
            ("canonical".to_string(), json!(true)),
        ]);
        registry.ensure("Label", &[label], props).await?;
    }

    for family in &seed.metric_families {
        let props: BTreeMap<String, Value> = BTreeMap::from([
            ("name".to_string(), json!(family)),
            ("namespace".to_string(), json!("service_graph")),
            ("signal_type".to_string(), json!("metrics")),
        ]);
        registry.ensure("Metric", &["service_graph", family], props).await?;
    }

    for service in &seed.services {
        let now = Utc::now();
        let definition = Service(Definition {
            id: service.to_string(),
            name: service.to_string(),
            namespace: "platform".to_string(),
            source: "seed".to_string(),
            tags: vec![],
            domain: "service".to_string(),
            signal_type: SignalType::Traces,
            classifier: "service".to_string(),
            datastore: String::new(),
            query_type: String::new(),
            formula: None,
            created_at: now,
            updated_at: now,
        });
        registry.ensure_definition(&definition).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::mock::InMemoryObjectStore;

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        let seed = EngineConfigSeed::default();
        ensure_telemetry_standards(&registry, &seed).await.unwrap();
        ensure_telemetry_standards(&registry, &seed).await.unwrap();

        let labels = registry
            .list("Label", &Default::default(), 100, 0)
            .await
            .unwrap();
        assert_eq!(labels.len(), CANONICAL_LABELS.len());

        let metrics = registry
            .list("Metric", &Default::default(), 100, 0)
            .await
            .unwrap();
        assert_eq!(metrics.len(), seed.metric_families.len());
    }

    #[tokio::test]
    async fn seeded_services_land_under_the_service_class_by_natural_key() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        let seed = EngineConfigSeed {
            services: vec!["checkout", "checkout"],
            ..EngineConfigSeed::default()
        };
        ensure_telemetry_standards(&registry, &seed).await.unwrap();

        let services = registry
            .list("Service", &Default::default(), 100, 0)
            .await
            .unwrap();
        assert_eq!(services.len(), 1, "same natural key collapses to one row");
        assert_eq!(services[0].properties.get("name"), Some(&json!("checkout")));
    }
}

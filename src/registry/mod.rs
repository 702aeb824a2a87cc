//! The durable, idempotent catalog of KPI and telemetry-dictionary objects (§4.1).
//!
//! `ObjectStore` is the abstract capability §1 calls out as an external
//! collaborator (class schema, upsert-by-id, GraphQL-style filtered list); this
//! module builds the `Registry` surface on top of it the way the teacher's
//! `ConfigDb` builds dashboard/alert/SLO CRUD on top of a raw `rusqlite`
//! connection. `SqliteObjectStore` is the reference implementation used outside
//! tests; `mock::InMemoryObjectStore` is used inside them.

pub mod mock;
pub mod seed;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::error::CoreError;
use crate::identity::make_id;
use crate::models::definitions::NaturalKey;

pub use sqlite::SqliteObjectStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Exact-match property equality.
    pub equals: BTreeMap<String, Value>,
    /// Property (expected to be an array) must contain every tag listed here.
    pub tags_contain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub class: String,
    pub id: String,
    pub properties: BTreeMap<String, Value>,
}

/// The abstract storage capability the Registry is built on. Non-goal per §1: the
/// storage engine behind it (vector DB, SQL, whatever) is an external collaborator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn is_ready(&self) -> bool;
    async fn ensure_class(&self, class: &str) -> Result<(), CoreError>;
    async fn put(&self, class: &str, id: &str, properties: BTreeMap<String, Value>) -> Result<(), CoreError>;
    async fn get(&self, class: &str, id: &str) -> Result<Option<StoredObject>, CoreError>;
    async fn list(&self, class: &str, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<StoredObject>, CoreError>;
    async fn delete(&self, class: &str, id: &str) -> Result<(), CoreError>;
    async fn dump(&self, classes: &[String]) -> Result<Vec<StoredObject>, CoreError>;
}

/// Time-leased readiness cache (§9's "readiness is a time-lease, not a background
/// thread" design note): the first caller within each TTL window probes the store;
/// everyone else in that window reuses the cached verdict.
pub struct ReadinessLease {
    ttl: chrono::Duration,
    last_probe: std::sync::RwLock<Option<(DateTime<Utc>, bool)>>,
}

impl ReadinessLease {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: chrono::Duration::seconds(ttl_secs as i64),
            last_probe: std::sync::RwLock::new(None),
        }
    }

    pub async fn check(&self, store: &dyn ObjectStore) -> bool {
        {
            let cache = self.last_probe.read().unwrap();
            if let Some((at, ready)) = *cache {
                if Utc::now() - at < self.ttl {
                    return ready;
                }
            }
        }
        let ready = store.is_ready().await;
        *self.last_probe.write().unwrap() = Some((Utc::now(), ready));
        ready
    }
}

pub struct Registry<S: ObjectStore> {
    store: S,
    readiness: ReadinessLease,
}

impl<S: ObjectStore> Registry<S> {
    pub fn new(store: S, readiness_ttl_secs: u64) -> Self {
        Self {
            store,
            readiness: ReadinessLease::new(readiness_ttl_secs),
        }
    }

    /// Whether the backing object store currently passes its readiness probe
    /// (time-leased, see [`ReadinessLease`]) — the check `handlers::healthz`
    /// surfaces to callers.
    pub async fn is_ready(&self) -> bool {
        self.readiness.check(&self.store).await
    }

    async fn require_ready(&self) -> Result<(), CoreError> {
        if self.is_ready().await {
            Ok(())
        } else {
            tracing::error!("registry object store failed its readiness probe");
            Err(CoreError::RegistryUnavailable(
                "object store readiness probe failed".into(),
            ))
        }
    }

    /// Upsert at a caller-supplied primary key — replace if present, create
    /// otherwise.
    pub async fn ensure_at_id(
        &self,
        class: &str,
        id: &str,
        properties: BTreeMap<String, Value>,
    ) -> Result<String, CoreError> {
        self.require_ready().await?;
        self.store.ensure_class(class).await?;
        self.store.put(class, id, properties).await?;
        Ok(id.to_string())
    }

    /// Upsert by natural key: the id is deterministically derived, so repeated
    /// calls with the same natural key converge on a single record (§4.1, §8).
    pub async fn ensure(
        &self,
        class: &str,
        natural_key_parts: &[&str],
        properties: BTreeMap<String, Value>,
    ) -> Result<String, CoreError> {
        let id = make_id(class, natural_key_parts).to_string();
        self.ensure_at_id(class, &id, properties).await
    }

    /// Upsert by natural key for a typed `models::definitions` class: the id and
    /// class name come from [`NaturalKey`], the stored properties from `T`'s own
    /// `Serialize` impl, so `Metric`/`Label`/`Service`/`Operation` definitions
    /// never need their fields re-typed into a property map by hand.
    pub async fn ensure_definition<T>(&self, definition: &T) -> Result<String, CoreError>
    where
        T: NaturalKey + Serialize,
    {
        let properties = match serde_json::to_value(definition).map_err(|e| CoreError::Internal(e.to_string()))? {
            Value::Object(map) => map.into_iter().collect(),
            _ => return Err(CoreError::Internal("definition did not serialize to a JSON object".into())),
        };
        let key_parts = definition.natural_key_parts();
        let parts: Vec<&str> = key_parts.iter().map(String::as_str).collect();
        self.ensure(T::class_name(), &parts, properties).await
    }

    pub async fn list(
        &self,
        class: &str,
        filter: &Filter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredObject>, CoreError> {
        self.require_ready().await?;
        self.store.list(class, filter, limit, offset).await
    }

    pub async fn get_by_id(&self, class: &str, id: &str) -> Result<StoredObject, CoreError> {
        self.require_ready().await?;
        self.store
            .get(class, id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                class: class.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn delete(&self, class: &str, id: &str) -> Result<(), CoreError> {
        self.require_ready().await?;
        self.store.delete(class, id).await
    }

    pub async fn dump(&self, classes: &[String]) -> Result<Vec<StoredObject>, CoreError> {
        self.require_ready().await?;
        self.store.dump(classes).await
    }

    /// Restore uses PUT-by-id semantics, so a crash mid-restore leaves a
    /// consistent prefix of the snapshot applied (§9).
    pub async fn restore(&self, records: Vec<StoredObject>) -> Result<usize, CoreError> {
        self.require_ready().await?;
        let mut applied = 0;
        for record in records {
            self.store.ensure_class(&record.class).await?;
            self.store.put(&record.class, &record.id, record.properties).await?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Newline-delimited-JSON snapshot, one `StoredObject` per line, so a
    /// snapshot can be streamed to any `Write` without materializing the
    /// whole dump in memory first.
    pub async fn dump_ndjson(&self, classes: &[String], mut out: impl Write) -> Result<usize, CoreError> {
        let records = self.dump(classes).await?;
        let count = records.len();
        for record in records {
            let line = serde_json::to_string(&record).map_err(|e| CoreError::Internal(e.to_string()))?;
            writeln!(out, "{line}").map_err(|e| CoreError::Internal(e.to_string()))?;
        }
        Ok(count)
    }

    pub async fn restore_ndjson(&self, input: impl BufRead) -> Result<usize, CoreError> {
        let mut records = Vec::new();
        for line in input.lines() {
            let line = line.map_err(|e| CoreError::Internal(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: StoredObject = serde_json::from_str(&line).map_err(|e| CoreError::Internal(e.to_string()))?;
            records.push(record);
        }
        self.restore(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::InMemoryObjectStore;

    fn props(name: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([("name".to_string(), Value::String(name.to_string()))])
    }

    #[tokio::test]
    async fn ensure_is_idempotent_on_natural_key() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        let id1 = registry
            .ensure("Metric", &["gateway", "http_requests_total"], props("http_requests_total"))
            .await
            .unwrap();
        let id2 = registry
            .ensure("Metric", &["gateway", "http_requests_total"], props("http_requests_total"))
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let all = registry.list("Metric", &Filter::default(), 100, 0).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn ensure_at_id_replaces_existing_properties() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        registry.ensure_at_id("KPIDefinition", "kpi-1", props("v1")).await.unwrap();
        registry.ensure_at_id("KPIDefinition", "kpi-1", props("v2")).await.unwrap();
        let obj = registry.get_by_id("KPIDefinition", "kpi-1").await.unwrap();
        assert_eq!(obj.properties.get("name"), Some(&Value::String("v2".into())));
    }

    #[tokio::test]
    async fn get_by_id_not_found_surfaces_error() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        let err = registry.get_by_id("KPIDefinition", "missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn is_ready_reflects_store_readiness() {
        let store = InMemoryObjectStore::new();
        store.set_ready(false);
        let registry = Registry::new(store, 30);
        assert!(!registry.is_ready().await);
    }

    #[tokio::test]
    async fn unready_store_surfaces_registry_unavailable() {
        let store = InMemoryObjectStore::new();
        store.set_ready(false);
        let registry = Registry::new(store, 30);
        let err = registry.list("Metric", &Filter::default(), 10, 0).await.unwrap_err();
        assert!(matches!(err, CoreError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn restore_is_idempotent_put_by_id() {
        let registry = Registry::new(InMemoryObjectStore::new(), 30);
        let records = vec![
            StoredObject {
                class: "Metric".into(),
                id: "m1".into(),
                properties: props("a"),
            },
            StoredObject {
                class: "Metric".into(),
                id: "m1".into(),
                properties: props("b"),
            },
        ];
        registry.restore(records).await.unwrap();
        let obj = registry.get_by_id("Metric", "m1").await.unwrap();
        assert_eq!(obj.properties.get("name"), Some(&Value::String("b".into())));
    }

    #[tokio::test]
    async fn ndjson_dump_round_trips_through_restore() {
        let source = Registry::new(InMemoryObjectStore::new(), 30);
        source.ensure_at_id("Metric", "m1", props("a")).await.unwrap();
        source.ensure_at_id("Metric", "m2", props("b")).await.unwrap();

        let mut buf: Vec<u8> = Vec::new();
        let count = source.dump_ndjson(&["Metric".to_string()], &mut buf).await.unwrap();
        assert_eq!(count, 2);

        let target = Registry::new(InMemoryObjectStore::new(), 30);
        let applied = target.restore_ndjson(buf.as_slice()).await.unwrap();
        assert_eq!(applied, 2);
        let obj = target.get_by_id("Metric", "m2").await.unwrap();
        assert_eq!(obj.properties.get("name"), Some(&Value::String("b".into())));
    }
}

//! In-memory `ObjectStore` used by Registry and higher-level tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Filter, ObjectStore, StoredObject};
use crate::error::CoreError;

#[derive(Default)]
pub struct InMemoryObjectStore {
    ready: Mutex<bool>,
    classes: Mutex<std::collections::BTreeSet<String>>,
    objects: Mutex<BTreeMap<(String, String), BTreeMap<String, Value>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }
}

fn matches(properties: &BTreeMap<String, Value>, filter: &Filter) -> bool {
    for (key, expected) in &filter.equals {
        if properties.get(key) != Some(expected) {
            return false;
        }
    }
    if !filter.tags_contain.is_empty() {
        let tags: Vec<String> = properties
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if !filter.tags_contain.iter().all(|t| tags.contains(t)) {
            return false;
        }
    }
    true
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    async fn ensure_class(&self, class: &str) -> Result<(), CoreError> {
        self.classes.lock().unwrap().insert(class.to_string());
        Ok(())
    }

    async fn put(&self, class: &str, id: &str, properties: BTreeMap<String, Value>) -> Result<(), CoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert((class.to_string(), id.to_string()), properties);
        Ok(())
    }

    async fn get(&self, class: &str, id: &str) -> Result<Option<StoredObject>, CoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(class.to_string(), id.to_string()))
            .cloned()
            .map(|properties| StoredObject {
                class: class.to_string(),
                id: id.to_string(),
                properties,
            }))
    }

    async fn list(&self, class: &str, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<StoredObject>, CoreError> {
        let objects = self.objects.lock().unwrap();
        let matched: Vec<StoredObject> = objects
            .iter()
            .filter(|((c, _), _)| c == class)
            .filter(|(_, props)| matches(props, filter))
            .skip(offset)
            .take(limit)
            .map(|((c, id), props)| StoredObject {
                class: c.clone(),
                id: id.clone(),
                properties: props.clone(),
            })
            .collect();
        Ok(matched)
    }

    async fn delete(&self, class: &str, id: &str) -> Result<(), CoreError> {
        self.objects.lock().unwrap().remove(&(class.to_string(), id.to_string()));
        Ok(())
    }

    async fn dump(&self, classes: &[String]) -> Result<Vec<StoredObject>, CoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((c, _), _)| classes.is_empty() || classes.contains(c))
            .map(|((c, id), props)| StoredObject {
                class: c.clone(),
                id: id.clone(),
                properties: props.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filter_matches_equality_and_tags() {
        let store = InMemoryObjectStore::new();
        store.ensure_class("Metric").await.unwrap();
        store
            .put(
                "Metric",
                "m1",
                BTreeMap::from([
                    ("namespace".to_string(), Value::String("gateway".into())),
                    ("tags".to_string(), Value::Array(vec![Value::String("http".into())])),
                ]),
            )
            .await
            .unwrap();

        let mut filter = Filter::default();
        filter.equals.insert("namespace".to_string(), Value::String("gateway".into()));
        filter.tags_contain.push("http".to_string());
        let results = store.list("Metric", &filter, 10, 0).await.unwrap();
        assert_eq!(results.len(), 1);

        filter.tags_contain.push("missing-tag".to_string());
        let results = store.list("Metric", &filter, 10, 0).await.unwrap();
        assert!(results.is_empty());
    }
}

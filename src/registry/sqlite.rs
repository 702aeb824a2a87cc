//! SQLite-backed reference `ObjectStore`, grounded in the teacher's `ConfigDb`:
//! WAL mode, a `Mutex<Connection>`, idempotent `CREATE TABLE IF NOT EXISTS`
//! migrations run once at open time. Properties are stored as a JSON blob per
//! row rather than one column per class-specific field, since the class schema
//! here is open-ended (§6 lists several classes, each with its own typed fields).

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Filter, ObjectStore, StoredObject};
use crate::error::CoreError;

pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
}

impl SqliteObjectStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS registry_objects (
                class       TEXT NOT NULL,
                id          TEXT NOT NULL,
                properties  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                PRIMARY KEY (class, id)
            );
            CREATE INDEX IF NOT EXISTS idx_registry_class ON registry_objects(class);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn to_error(e: rusqlite::Error) -> CoreError {
        CoreError::RegistryUnavailable(e.to_string())
    }
}

fn row_to_object(class: String, id: String, raw: String) -> Result<StoredObject, CoreError> {
    let properties: BTreeMap<String, Value> =
        serde_json::from_str(&raw).map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(StoredObject { class, id, properties })
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn is_ready(&self) -> bool {
        self.conn
            .lock()
            .unwrap()
            .execute_batch("SELECT 1")
            .is_ok()
    }

    async fn ensure_class(&self, _class: &str) -> Result<(), CoreError> {
        // The flat `registry_objects` table backs every class; no per-class DDL
        // needed beyond the migration run at open time.
        Ok(())
    }

    async fn put(&self, class: &str, id: &str, properties: BTreeMap<String, Value>) -> Result<(), CoreError> {
        let raw = serde_json::to_string(&properties).map_err(|e| CoreError::Internal(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO registry_objects (class, id, properties) VALUES (?1, ?2, ?3)
             ON CONFLICT(class, id) DO UPDATE SET
                properties = excluded.properties,
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')",
            params![class, id, raw],
        )
        .map_err(Self::to_error)?;
        Ok(())
    }

    async fn get(&self, class: &str, id: &str) -> Result<Option<StoredObject>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT properties FROM registry_objects WHERE class = ?1 AND id = ?2",
            params![class, id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(raw) => Ok(Some(row_to_object(class.to_string(), id.to_string(), raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Self::to_error(e)),
        }
    }

    async fn list(&self, class: &str, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<StoredObject>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, properties FROM registry_objects WHERE class = ?1 ORDER BY id")
            .map_err(Self::to_error)?;
        let rows = stmt
            .query_map(params![class], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(Self::to_error)?;

        let mut matched = Vec::new();
        for row in rows {
            let (id, raw) = row.map_err(Self::to_error)?;
            let obj = row_to_object(class.to_string(), id, raw)?;
            if filter_matches(&obj.properties, filter) {
                matched.push(obj);
            }
        }
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, class: &str, id: &str) -> Result<(), CoreError> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM registry_objects WHERE class = ?1 AND id = ?2",
                params![class, id],
            )
            .map_err(Self::to_error)?;
        Ok(())
    }

    async fn dump(&self, classes: &[String]) -> Result<Vec<StoredObject>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT class, id, properties FROM registry_objects ORDER BY class, id")
            .map_err(Self::to_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(Self::to_error)?;

        let mut out = Vec::new();
        for row in rows {
            let (class, id, raw) = row.map_err(Self::to_error)?;
            if classes.is_empty() || classes.contains(&class) {
                out.push(row_to_object(class, id, raw)?);
            }
        }
        Ok(out)
    }
}

fn filter_matches(properties: &BTreeMap<String, Value>, filter: &Filter) -> bool {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_properties() {
        let store = SqliteObjectStore::open(":memory:").unwrap();
        let mut props = BTreeMap::new();
        props.insert("name".to_string(), Value::String("http_requests_total".into()));
        store.put("Metric", "m1", props.clone()).await.unwrap();
        let obj = store.get("Metric", "m1").await.unwrap().unwrap();
        assert_eq!(obj.properties, props);
    }

    #[tokio::test]
    async fn repeated_put_is_an_upsert() {
        let store = SqliteObjectStore::open(":memory:").unwrap();
        store
            .put("Metric", "m1", BTreeMap::from([("v".to_string(), Value::from(1))]))
            .await
            .unwrap();
        store
            .put("Metric", "m1", BTreeMap::from([("v".to_string(), Value::from(2))]))
            .await
            .unwrap();
        let all = store.dump(&[]).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].properties.get("v"), Some(&Value::from(2)));
    }
}

//! `KVCache` — the engine's result cache (§4.4, `CacheOptions`). A small
//! `Mutex<HashMap>` with a per-entry TTL, the same shape the teacher reaches for
//! wherever a short-lived computed value needs caching without pulling in a
//! full caching crate.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::result::UnifiedResult;

struct Entry {
    value: UnifiedResult,
    expires_at: Instant,
}

pub struct KVCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KVCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<UnifiedResult> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: UnifiedResult, ttl: Duration) {
        self.entries.lock().unwrap().insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

impl Default for KVCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache key: query type + query text + resolved window + sorted parameters.
/// Two structurally identical queries always hash the same regardless of map
/// iteration order, since `parameters` is a `BTreeMap`.
pub fn cache_key(query: &crate::models::unified_query::UnifiedQuery) -> String {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    query.query_type.hash_discriminant().hash(&mut hasher);
    query.query.hash(&mut hasher);
    query.start.map(|t| t.timestamp()).hash(&mut hasher);
    query.end.map(|t| t.timestamp()).hash(&mut hasher);
    for (k, v) in &query.parameters {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    format!("uq:{:x}", hasher.finish())
}

trait HashDiscriminant {
    fn hash_discriminant(&self) -> u8;
}

impl HashDiscriminant for crate::models::unified_query::QueryType {
    fn hash_discriminant(&self) -> u8 {
        use crate::models::unified_query::QueryType::*;
        match self {
            Metrics => 0,
            Logs => 1,
            Traces => 2,
            Correlation => 3,
        }
    }
}

//! `UnifiedQuery` and the knobs that govern how the engine executes it (§3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Metrics,
    Logs,
    Traces,
    Correlation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheOptions {
    #[serde(default)]
    pub bypass_cache: bool,
    #[serde(with = "duration_secs_opt", default)]
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationOptions {
    #[serde(default = "default_correlation_keys")]
    pub correlation_keys: Vec<String>,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            correlation_keys: default_correlation_keys(),
        }
    }
}

fn default_correlation_keys() -> Vec<String> {
    vec!["trace_id".to_string(), "service".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub query: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs_opt", default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub correlation_options: CorrelationOptions,
    #[serde(default)]
    pub cache_options: CacheOptions,
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_u64(d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

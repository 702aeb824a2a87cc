//! Metric/Label/Service/Operation definitions and their append-only Versions (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Metrics,
    Traces,
    Logs,
    Business,
    Synthetic,
}

/// The natural key each definition class is hashed from — see [`crate::identity`].
pub trait NaturalKey {
    fn class_name() -> &'static str;
    fn natural_key_parts(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub domain: String,
    pub signal_type: SignalType,
    pub classifier: String,
    pub datastore: String,
    pub query_type: String,
    #[serde(default)]
    pub formula: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

macro_rules! definition_class {
    ($name:ident, $class:literal) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name(pub Definition);

        impl NaturalKey for $name {
            fn class_name() -> &'static str {
                $class
            }

            fn natural_key_parts(&self) -> Vec<String> {
                vec![self.0.namespace.clone(), self.0.name.clone()]
            }
        }
    };
}

definition_class!(Metric, "Metric");
definition_class!(Label, "Label");
definition_class!(Service, "Service");
definition_class!(Operation, "Operation");

/// Append-only versioned counterpart — never mutated in place, per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub definition_id: String,
    pub revision: u64,
    pub effective_start: DateTime<Utc>,
    pub effective_end: Option<DateTime<Utc>>,
    pub snapshot: T,
}

//! Mirador-Core: a unified observability gateway fronting metrics, logs, and
//! trace backends behind narrow capability traits, with a query-language
//! layer, a correlation/unified-query engine, a service-graph builder, an RCA
//! engine, and a metadata/KPI registry on top.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod query_lang;
pub mod rca;
pub mod registry;
pub mod service_graph;
pub mod time_range;

pub use error::{CoreError, CoreResult};

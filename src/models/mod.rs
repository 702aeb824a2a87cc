pub mod correlation;
pub mod definitions;
pub mod kpi;
pub mod rca;
pub mod result;
pub mod service_graph;
pub mod unified_query;
pub mod uql;

//! Directed service-graph topology from span-edge metrics (§3, §4.5).

use serde::{Deserialize, Serialize};

use crate::time_range::TimeRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceGraphEdge {
    pub source: String,
    pub target: String,
    pub connection_type: String,
    pub call_count: u64,
    pub call_rate: f64,
    pub error_count: u64,
    pub error_rate: f64,
    pub server_latency_ms: f64,
    pub client_latency_ms: f64,
    pub unpaired_spans: u64,
    pub dropped_spans: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGraphWindow {
    pub range: TimeRange,
    pub client: Option<String>,
    pub server: Option<String>,
    pub connection_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGraphData {
    pub window: ServiceGraphWindow,
    pub edges: Vec<ServiceGraphEdge>,
}

impl ServiceGraphData {
    /// Directed neighbours of `service`, outbound and inbound, for hop-bounded
    /// graph walks (RCA's neighbourhood build, §4.6.1 step 5).
    pub fn neighbours(&self, service: &str) -> Vec<&ServiceGraphEdge> {
        self.edges
            .iter()
            .filter(|e| e.source == service || e.target == service)
            .collect()
    }
}

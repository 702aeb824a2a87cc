//! Top-level config loaded from `mirador.toml`, the way the teacher's `WideConfig`
//! is loaded from `wide.toml`: a `serde`-deserialized struct with `Default` impls
//! for every knob so an empty file still boots. Environment variables layer on top
//! for the bits §6 lists as "environment inputs" (endpoints, API keys) — those stay
//! outside this struct since the transports themselves are non-goals of the core.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rca: RcaConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            rca: RcaConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sub_query_timeout_secs")]
    pub sub_query_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sub_query_timeout_secs: default_sub_query_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_sub_query_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RcaConfig {
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,
    #[serde(default = "default_max_chains")]
    pub max_chains: usize,
    #[serde(default = "default_max_steps_per_chain")]
    pub max_steps_per_chain: usize,
    #[serde(default = "default_min_score_threshold")]
    pub min_score_threshold: f64,
    #[serde(default = "default_ring_weights")]
    pub ring_weights: HashMap<String, f64>,
    /// Ring boundaries in seconds-from-peak: `[R0_max, R1_max, R2_max]`,
    /// anything past the last bound falls in R3.
    #[serde(default = "default_ring_bounds_secs")]
    pub ring_bounds_secs: [u64; 3],
    #[serde(default = "default_alignment_bonus")]
    pub alignment_bonus: f64,
    #[serde(default = "default_alignment_penalty")]
    pub alignment_penalty: f64,
    #[serde(default = "default_kpi_negative_bias")]
    pub scoring_bias_kpi_negative: f64,
    #[serde(default = "default_kpi_positive_bias")]
    pub scoring_bias_kpi_positive: f64,
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            overall_timeout_secs: default_overall_timeout_secs(),
            max_chains: default_max_chains(),
            max_steps_per_chain: default_max_steps_per_chain(),
            min_score_threshold: default_min_score_threshold(),
            ring_weights: default_ring_weights(),
            ring_bounds_secs: default_ring_bounds_secs(),
            alignment_bonus: default_alignment_bonus(),
            alignment_penalty: default_alignment_penalty(),
            scoring_bias_kpi_negative: default_kpi_negative_bias(),
            scoring_bias_kpi_positive: default_kpi_positive_bias(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

fn default_overall_timeout_secs() -> u64 {
    60
}

fn default_max_chains() -> usize {
    10
}

fn default_max_steps_per_chain() -> usize {
    5
}

fn default_min_score_threshold() -> f64 {
    0.1
}

fn default_ring_weights() -> HashMap<String, f64> {
    HashMap::from([
        ("R0".to_string(), 1.0),
        ("R1".to_string(), 0.8),
        ("R2".to_string(), 0.5),
        ("R3".to_string(), 0.2),
    ])
}

fn default_ring_bounds_secs() -> [u64; 3] {
    [60, 300, 900]
}

fn default_alignment_bonus() -> f64 {
    0.10
}

fn default_alignment_penalty() -> f64 {
    0.20
}

fn default_kpi_negative_bias() -> f64 {
    0.05
}

fn default_kpi_positive_bias() -> f64 {
    0.05
}

fn default_anomaly_threshold() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_readiness_ttl_secs")]
    pub readiness_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            readiness_ttl_secs: default_readiness_ttl_secs(),
        }
    }
}

fn default_readiness_ttl_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = CoreConfig::load("/nonexistent/mirador.toml").unwrap();
        assert_eq!(cfg.engine.sub_query_timeout_secs, 30);
        assert_eq!(cfg.rca.max_chains, 10);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let cfg: CoreConfig = toml::from_str("[rca]\nmax_chains = 3\n").unwrap();
        assert_eq!(cfg.rca.max_chains, 3);
        assert_eq!(cfg.rca.max_steps_per_chain, 5);
        assert_eq!(cfg.engine.sub_query_timeout_secs, 30);
    }
}

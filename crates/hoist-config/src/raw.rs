use serde::{Deserialize, Serialize};

/// Raw YAML representation of the server config file (hoist.yml)
#[derive(Debug, Deserialize, Serialize)]
pub struct RawServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub store: RawStore,
    #[serde(default)]
    pub broker: RawBroker,
    #[serde(default)]
    pub pipeline: RawPipeline,
    #[serde(default)]
    pub clusters: Vec<RawCluster>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7400
}

/// "memory" (default), "redb" with `path`, or "postgres" with `url`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawStore {
    #[serde(default)]
    pub kind: String,
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawBroker {
    /// 0 means unbounded.
    #[serde(default)]
    pub queue_capacity: usize,
    pub health_interval_secs: Option<u64>,
    pub degraded_depth: Option<u64>,
    pub unhealthy_depth: Option<u64>,
    pub ack_timeout_secs: Option<u64>,
    pub ack_scan_interval_secs: Option<u64>,
    #[serde(default)]
    pub delivery: RawDelivery,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawDelivery {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawPipeline {
    pub approval_timeout_secs: Option<u64>,
    pub min_healthy_fraction: Option<f64>,
    pub smoke_test_timeout_secs: Option<u64>,
    /// Absent disables stabilization gating entirely.
    pub stabilization: Option<RawStabilization>,
    pub rolling_batch_size: Option<usize>,
    pub rolling_failure_threshold: Option<u32>,
    pub canary_soak_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawStabilization {
    pub cpu_delta_percent: Option<f64>,
    pub memory_delta_percent: Option<f64>,
    pub latency_delta_percent: Option<f64>,
    pub polling_interval_secs: Option<u64>,
    pub consecutive_stable_checks: Option<u32>,
    pub minimum_wait_secs: Option<u64>,
    pub maximum_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawCluster {
    pub environment: String,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawNode {
    pub hostname: String,
    #[serde(default = "default_node_port")]
    pub port: u16,
}

fn default_node_port() -> u16 {
    9400
}

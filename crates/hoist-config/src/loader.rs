use std::path::Path;
use std::time::Duration;

use hoist_domain::Environment;
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawServerConfig, RawStabilization};

/// Which persistence backend the server runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redb { path: String },
    Postgres { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// 0 means unbounded.
    pub queue_capacity: usize,
    pub health_interval: Duration,
    pub degraded_depth: u64,
    pub unhealthy_depth: u64,
    pub ack_timeout: Duration,
    pub ack_scan_interval: Duration,
    pub delivery: DeliverySettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StabilizationSettings {
    pub cpu_delta_percent: f64,
    pub memory_delta_percent: f64,
    pub latency_delta_percent: f64,
    pub polling_interval: Duration,
    pub consecutive_stable_checks: u32,
    pub minimum_wait: Duration,
    pub maximum_wait: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub approval_timeout: Duration,
    pub min_healthy_fraction: f64,
    pub smoke_test_timeout: Duration,
    pub stabilization: Option<StabilizationSettings>,
    pub rolling_batch_size: Option<usize>,
    pub rolling_failure_threshold: u32,
    pub canary_soak: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub environment: Environment,
    pub nodes: Vec<NodeSpec>,
}

/// Fully validated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub store: StoreBackend,
    pub broker: BrokerSettings,
    pub pipeline: PipelineSettings,
    pub clusters: Vec<ClusterTopology>,
}

/// Load and validate the server config from a YAML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawServerConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        })?;
    debug!("Loading server config from {}", path.display());
    convert(raw, path)
}

fn convert(raw: RawServerConfig, path: &Path) -> Result<ServerConfig, ConfigError> {
    let store = match raw.store.kind.as_str() {
        "" | "memory" => StoreBackend::Memory,
        "redb" => {
            let Some(store_path) = raw.store.path else {
                return Err(conversion(path, "store.kind redb requires store.path"));
            };
            StoreBackend::Redb { path: store_path }
        }
        "postgres" => {
            let Some(url) = raw.store.url else {
                return Err(conversion(path, "store.kind postgres requires store.url"));
            };
            StoreBackend::Postgres { url }
        }
        other => {
            return Err(conversion(path, format!("unknown store kind '{}'", other)));
        }
    };

    let degraded_depth = raw.broker.degraded_depth.unwrap_or(500);
    let unhealthy_depth = raw.broker.unhealthy_depth.unwrap_or(1000);
    if unhealthy_depth < degraded_depth {
        return Err(conversion(
            path,
            format!(
                "unhealthy_depth ({}) must not be below degraded_depth ({})",
                unhealthy_depth, degraded_depth
            ),
        ));
    }

    let broker = BrokerSettings {
        queue_capacity: raw.broker.queue_capacity,
        health_interval: Duration::from_secs(raw.broker.health_interval_secs.unwrap_or(5)),
        degraded_depth,
        unhealthy_depth,
        ack_timeout: Duration::from_secs(raw.broker.ack_timeout_secs.unwrap_or(30)),
        ack_scan_interval: Duration::from_secs(
            raw.broker.ack_scan_interval_secs.unwrap_or(5),
        ),
        delivery: DeliverySettings {
            max_retries: raw.broker.delivery.max_retries.unwrap_or(5),
            initial_backoff: Duration::from_millis(
                raw.broker.delivery.initial_backoff_ms.unwrap_or(100),
            ),
            max_backoff: Duration::from_millis(
                raw.broker.delivery.max_backoff_ms.unwrap_or(5000),
            ),
            multiplier: raw.broker.delivery.multiplier.unwrap_or(2.0),
        },
    };
    if broker.delivery.multiplier < 1.0 {
        return Err(conversion(path, "delivery.multiplier must be at least 1.0"));
    }

    let min_healthy_fraction = raw.pipeline.min_healthy_fraction.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&min_healthy_fraction) {
        return Err(conversion(
            path,
            format!("min_healthy_fraction {} out of range [0, 1]", min_healthy_fraction),
        ));
    }

    let pipeline = PipelineSettings {
        approval_timeout: Duration::from_secs(
            raw.pipeline.approval_timeout_secs.unwrap_or(15 * 60),
        ),
        min_healthy_fraction,
        smoke_test_timeout: Duration::from_secs(
            raw.pipeline.smoke_test_timeout_secs.unwrap_or(5 * 60),
        ),
        stabilization: raw.pipeline.stabilization.map(convert_stabilization),
        rolling_batch_size: raw.pipeline.rolling_batch_size,
        rolling_failure_threshold: raw.pipeline.rolling_failure_threshold.unwrap_or(0),
        canary_soak: Duration::from_secs(raw.pipeline.canary_soak_secs.unwrap_or(30)),
    };

    let mut clusters = Vec::new();
    for raw_cluster in raw.clusters {
        let environment = Environment::parse(&raw_cluster.environment).map_err(|_| {
            conversion(
                path,
                format!("unknown environment '{}'", raw_cluster.environment),
            )
        })?;
        if clusters
            .iter()
            .any(|c: &ClusterTopology| c.environment == environment)
        {
            return Err(conversion(
                path,
                format!("duplicate cluster for environment '{}'", environment),
            ));
        }
        let nodes = raw_cluster
            .nodes
            .into_iter()
            .map(|n| NodeSpec { hostname: n.hostname, port: n.port })
            .collect();
        clusters.push(ClusterTopology { environment, nodes });
    }

    Ok(ServerConfig {
        bind: raw.bind,
        port: raw.port,
        store,
        broker,
        pipeline,
        clusters,
    })
}

fn convert_stabilization(raw: RawStabilization) -> StabilizationSettings {
    StabilizationSettings {
        cpu_delta_percent: raw.cpu_delta_percent.unwrap_or(10.0),
        memory_delta_percent: raw.memory_delta_percent.unwrap_or(10.0),
        latency_delta_percent: raw.latency_delta_percent.unwrap_or(20.0),
        polling_interval: Duration::from_secs(raw.polling_interval_secs.unwrap_or(5)),
        consecutive_stable_checks: raw.consecutive_stable_checks.unwrap_or(3),
        minimum_wait: Duration::from_secs(raw.minimum_wait_secs.unwrap_or(10)),
        maximum_wait: Duration::from_secs(raw.maximum_wait_secs.unwrap_or(30 * 60)),
    }
}

fn conversion(path: &Path, message: impl Into<String>) -> ConfigError {
    ConfigError::Conversion {
        path: path.display().to_string(),
        message: message.into(),
    }
}

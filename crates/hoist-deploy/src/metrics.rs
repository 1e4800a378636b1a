use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hoist_domain::{Environment, NodeId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DeployError;

/// Resource snapshot for one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub latency_ms: f64,
}

/// Aggregate metrics across a set of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClusterMetrics {
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
    pub avg_latency_ms: f64,
    pub node_count: usize,
}

impl ClusterMetrics {
    pub fn aggregate(nodes: &[NodeMetrics]) -> Self {
        if nodes.is_empty() {
            return Self::default();
        }
        let n = nodes.len() as f64;
        Self {
            avg_cpu_percent: nodes.iter().map(|m| m.cpu_percent).sum::<f64>() / n,
            avg_memory_percent: nodes.iter().map(|m| m.memory_percent).sum::<f64>() / n,
            avg_latency_ms: nodes.iter().map(|m| m.latency_ms).sum::<f64>() / n,
            node_count: nodes.len(),
        }
    }
}

/// Supplies per-node and per-cluster resource snapshots. Injected at assembly
/// time; production deployments back this with their monitoring stack.
#[async_trait]
pub trait MetricsProvider: Send + Sync + 'static {
    async fn cluster_metrics(&self, env: Environment) -> Result<ClusterMetrics, DeployError>;

    async fn nodes_metrics(&self, ids: &[NodeId]) -> Result<Vec<NodeMetrics>, DeployError>;
}

/// A [`MetricsProvider`] serving values set programmatically.
///
/// Nodes without an explicit entry report the provider-wide default. Suitable
/// for local serves and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMetricsProvider {
    default: NodeMetrics,
    nodes: Arc<RwLock<HashMap<NodeId, NodeMetrics>>>,
}

impl StaticMetricsProvider {
    pub fn new(default: NodeMetrics) -> Self {
        Self { default, nodes: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn set_node(&self, id: NodeId, metrics: NodeMetrics) {
        self.nodes.write().await.insert(id, metrics);
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn cluster_metrics(&self, _env: Environment) -> Result<ClusterMetrics, DeployError> {
        let guard = self.nodes.read().await;
        let all: Vec<NodeMetrics> = guard.values().copied().collect();
        if all.is_empty() {
            return Ok(ClusterMetrics::aggregate(&[self.default]));
        }
        Ok(ClusterMetrics::aggregate(&all))
    }

    async fn nodes_metrics(&self, ids: &[NodeId]) -> Result<Vec<NodeMetrics>, DeployError> {
        let guard = self.nodes.read().await;
        Ok(ids
            .iter()
            .map(|id| guard.get(id).copied().unwrap_or(self.default))
            .collect())
    }
}

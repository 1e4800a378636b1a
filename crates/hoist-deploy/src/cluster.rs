use std::collections::HashMap;
use std::sync::Arc;

use hoist_domain::{Environment, NodeId, NodeState};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::node::KernelNode;

/// Point-in-time view of a cluster's node states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub unhealthy_nodes: usize,
}

impl ClusterHealth {
    /// Fraction of nodes able to serve traffic, 0.0 for an empty cluster.
    pub fn healthy_fraction(&self) -> f64 {
        if self.total_nodes == 0 {
            return 0.0;
        }
        self.healthy_nodes as f64 / self.total_nodes as f64
    }
}

/// All nodes of one environment. The cluster owns its nodes; everywhere else
/// holds only `NodeId`s.
#[derive(Debug)]
pub struct EnvironmentCluster {
    environment: Environment,
    nodes: Vec<KernelNode>,
}

impl EnvironmentCluster {
    pub fn new(environment: Environment) -> Self {
        Self { environment, nodes: Vec::new() }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Add a node. The node's environment must match the cluster's.
    pub fn add_node(&mut self, node: KernelNode) -> Result<(), DeployError> {
        if node.environment() != self.environment {
            return Err(DeployError::EnvironmentMismatch {
                node: node.node_id(),
                node_env: node.environment(),
                cluster_env: self.environment,
            });
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[KernelNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&KernelNode> {
        self.nodes.iter().find(|n| n.node_id() == id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.node_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Poll node states. Idle nodes count as healthy (they can take a
    /// deployment); Deploying nodes count in the total only.
    pub async fn cluster_health(&self) -> ClusterHealth {
        let mut healthy = 0;
        let mut unhealthy = 0;
        for node in &self.nodes {
            match node.state().await {
                NodeState::Healthy | NodeState::Idle => healthy += 1,
                NodeState::Unhealthy | NodeState::Failed => unhealthy += 1,
                NodeState::Deploying => {}
            }
        }
        ClusterHealth {
            total_nodes: self.nodes.len(),
            healthy_nodes: healthy,
            unhealthy_nodes: unhealthy,
        }
    }
}

/// One cluster per environment, shared across the pipeline and the API.
#[derive(Debug, Default)]
pub struct ClusterSet {
    clusters: HashMap<Environment, Arc<EnvironmentCluster>>,
}

impl ClusterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cluster: EnvironmentCluster) {
        self.clusters.insert(cluster.environment(), Arc::new(cluster));
    }

    pub fn get(&self, env: Environment) -> Option<Arc<EnvironmentCluster>> {
        self.clusters.get(&env).cloned()
    }

    pub fn environments(&self) -> Vec<Environment> {
        self.clusters.keys().copied().collect()
    }
}

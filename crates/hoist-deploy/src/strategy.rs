use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoist_domain::{DeploymentRequest, Environment, Module, StrategyKind};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::canary::CanaryConfig;
use crate::cluster::EnvironmentCluster;
use crate::error::DeployError;
use crate::node::{KernelNode, NodeDeployResult};
use crate::rolling::RollingConfig;
use crate::stabilize::{ResourceStabilizationService, StabilizationConfig};

/// Everything a strategy needs beyond the request and the cluster.
#[derive(Clone)]
pub struct StrategyContext {
    /// When set, blue-green and canary gate on resource stabilization.
    pub stabilization: Option<(Arc<ResourceStabilizationService>, StabilizationConfig)>,
    pub smoke_test_timeout: Duration,
    pub rolling: RollingConfig,
    pub canary: CanaryConfig,
    pub cancel: CancellationToken,
}

impl Default for StrategyContext {
    fn default() -> Self {
        Self {
            stabilization: None,
            smoke_test_timeout: Duration::from_secs(5 * 60),
            rolling: RollingConfig::default(),
            canary: CanaryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of one strategy run. Node-level detail is carried in
/// `node_results`; `success` is the strategy's overall verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub strategy: StrategyKind,
    pub environment: Environment,
    pub message: String,
    pub node_results: Vec<NodeDeployResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn nodes_deployed(&self) -> u32 {
        self.node_results.iter().filter(|r| r.success).count() as u32
    }

    pub fn nodes_failed(&self) -> u32 {
        self.node_results.iter().filter(|r| !r.success).count() as u32
    }
}

/// Builder for strategy results so every exit path stamps the same envelope.
pub(crate) struct ResultBuilder {
    strategy: StrategyKind,
    environment: Environment,
    started_at: DateTime<Utc>,
}

impl ResultBuilder {
    pub(crate) fn new(strategy: StrategyKind, environment: Environment) -> Self {
        Self { strategy, environment, started_at: Utc::now() }
    }

    pub(crate) fn finish(
        self,
        success: bool,
        message: impl Into<String>,
        node_results: Vec<NodeDeployResult>,
    ) -> DeploymentResult {
        DeploymentResult {
            success,
            strategy: self.strategy,
            environment: self.environment,
            message: message.into(),
            node_results,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// A stage engine that rolls a module across a cluster.
///
/// Operational failures are reported in-band through [`DeploymentResult`];
/// `Err` is reserved for cancellation and infrastructure faults.
#[async_trait]
pub trait DeploymentStrategy: Send + Sync + 'static {
    fn kind(&self) -> StrategyKind;

    /// Stable name for telemetry, matching `StrategyKind::to_string`.
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        request: &DeploymentRequest,
        cluster: &EnvironmentCluster,
        ctx: &StrategyContext,
    ) -> Result<DeploymentResult, DeployError>;
}

/// Dispatches deployments to the registered [`DeploymentStrategy`] for a
/// [`StrategyKind`]. Per-instance; no process-wide registry exists.
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn DeploymentStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self { strategies: HashMap::new() }
    }

    /// Register a strategy under its own kind. Returns `&mut self` for chaining.
    pub fn register(&mut self, strategy: Arc<dyn DeploymentStrategy>) -> &mut Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn for_kind(&self, kind: StrategyKind) -> Result<Arc<dyn DeploymentStrategy>, DeployError> {
        self.strategies
            .get(&kind)
            .cloned()
            .ok_or(DeployError::StrategyNotConfigured(kind))
    }

    pub fn registered_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.keys().copied().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deploy `module` to every node concurrently and collect per-node results
/// in the input order.
pub(crate) async fn deploy_all(
    nodes: &[KernelNode],
    module: &Module,
    cancel: &CancellationToken,
) -> Vec<NodeDeployResult> {
    let mut set = JoinSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let node = node.clone();
        let module = module.clone();
        let cancel = cancel.clone();
        set.spawn(async move { (index, node.deploy(&module, &cancel).await) });
    }

    let mut results: Vec<Option<NodeDeployResult>> = (0..nodes.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        if let Ok((index, result)) = joined {
            results[index] = Some(result);
        }
    }
    results.into_iter().flatten().collect()
}

/// Probe every node's health within `timeout`. Returns the unhealthy count,
/// or `None` when the probes did not finish in time.
pub(crate) async fn smoke_test(nodes: &[KernelNode], timeout: Duration) -> Option<usize> {
    let probes = async {
        let mut unhealthy = 0;
        for node in nodes {
            if !node.probe_health().await {
                unhealthy += 1;
            }
        }
        unhealthy
    };
    tokio::time::timeout(timeout, probes).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectStrategy;

    #[test]
    fn registry_round_trip() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(DirectStrategy));

        assert!(registry.for_kind(StrategyKind::Direct).is_ok());
        let err = match registry.for_kind(StrategyKind::Canary) {
            Err(e) => e,
            Ok(_) => panic!("expected StrategyNotConfigured error"),
        };
        assert!(matches!(
            err,
            DeployError::StrategyNotConfigured(StrategyKind::Canary)
        ));
    }
}

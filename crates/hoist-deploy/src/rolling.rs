use std::time::Duration;

use async_trait::async_trait;
use hoist_domain::{DeploymentRequest, Module, StrategyKind};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::EnvironmentCluster;
use crate::error::DeployError;
use crate::node::{KernelNode, NodeDeployResult};
use crate::strategy::{
    deploy_all, DeploymentResult, DeploymentStrategy, ResultBuilder, StrategyContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingConfig {
    /// Nodes per batch. `None` derives `max(1, ⌈n/4⌉)` from the fleet size.
    pub batch_size: Option<usize>,
    /// Unhealthy nodes tolerated between batches before aborting.
    pub failure_threshold: u32,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self { batch_size: None, failure_threshold: 0 }
    }
}

impl RollingConfig {
    pub fn effective_batch_size(&self, fleet: usize) -> usize {
        self.batch_size
            .unwrap_or_else(|| std::cmp::max(1, fleet.div_ceil(4)))
    }
}

/// Outcome of the shared batch loop, consumed by both the rolling strategy
/// itself and canary promotion.
pub(crate) struct RollingOutcome {
    pub node_results: Vec<NodeDeployResult>,
    pub batches_run: usize,
    pub aborted: Option<String>,
}

/// Deploy `nodes` in batches, health-checking all completed nodes between
/// batches. Exceeding `failure_threshold` unhealthy nodes aborts the
/// remaining batches; already-deployed nodes stay in place.
pub(crate) async fn run_batches(
    nodes: &[KernelNode],
    module: &Module,
    config: &RollingConfig,
    cancel: &CancellationToken,
) -> Result<RollingOutcome, DeployError> {
    let batch_size = config.effective_batch_size(nodes.len());
    let mut node_results: Vec<NodeDeployResult> = Vec::with_capacity(nodes.len());
    let mut completed: Vec<&KernelNode> = Vec::with_capacity(nodes.len());
    let mut batches_run = 0usize;

    for batch in nodes.chunks(batch_size) {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        batches_run += 1;
        let batch_results = deploy_all(batch, module, cancel).await;
        node_results.extend(batch_results);
        completed.extend(batch.iter());

        let mut unhealthy = 0u32;
        for node in &completed {
            if !node.probe_health().await {
                unhealthy += 1;
            }
        }
        if unhealthy > config.failure_threshold {
            warn!(
                batch = batches_run,
                unhealthy,
                threshold = config.failure_threshold,
                "rolling deployment aborted"
            );
            return Ok(RollingOutcome {
                node_results,
                batches_run,
                aborted: Some(format!(
                    "Aborted after batch {}: {} unhealthy node(s) exceeded threshold {}",
                    batches_run, unhealthy, config.failure_threshold
                )),
            });
        }
    }

    Ok(RollingOutcome { node_results, batches_run, aborted: None })
}

/// Batched fleet rollout with inter-batch health gating. A partial run
/// reports `success=false` with per-node detail; regression of the already
/// deployed nodes is the pipeline rollback stage's job.
#[derive(Debug, Default, Clone)]
pub struct RollingStrategy;

#[async_trait]
impl DeploymentStrategy for RollingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rolling
    }

    fn name(&self) -> &'static str {
        "rolling"
    }

    async fn execute(
        &self,
        request: &DeploymentRequest,
        cluster: &EnvironmentCluster,
        ctx: &StrategyContext,
    ) -> Result<DeploymentResult, DeployError> {
        let result = ResultBuilder::new(self.kind(), cluster.environment());
        if cluster.is_empty() {
            return Ok(result.finish(false, "No nodes available", Vec::new()));
        }

        let outcome =
            run_batches(cluster.nodes(), &request.module, &ctx.rolling, &ctx.cancel).await?;

        if let Some(reason) = outcome.aborted {
            return Ok(result.finish(false, reason, outcome.node_results));
        }

        let failed = outcome.node_results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            return Ok(result.finish(
                false,
                format!(
                    "Rolling deployment finished with {} failed node(s) across {} batch(es)",
                    failed, outcome.batches_run
                ),
                outcome.node_results,
            ));
        }

        info!(
            execution_id = %request.execution_id,
            nodes = outcome.node_results.len(),
            batches = outcome.batches_run,
            "rolling deployment complete"
        );
        let deployed = outcome.node_results.len();
        Ok(result.finish(
            true,
            format!(
                "Successfully deployed to {} node(s) in {} batch(es) using rolling strategy",
                deployed, outcome.batches_run
            ),
            outcome.node_results,
        ))
    }
}

/// Soak wait used by canary promotion; lives here so the batch machinery and
/// its pacing stay together.
pub(crate) async fn cancellable_sleep(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DeployError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

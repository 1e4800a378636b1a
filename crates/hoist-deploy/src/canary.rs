use std::time::Duration;

use async_trait::async_trait;
use hoist_domain::{DeploymentRequest, StrategyKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cluster::EnvironmentCluster;
use crate::error::DeployError;
use crate::rolling::{cancellable_sleep, run_batches};
use crate::strategy::{
    deploy_all, DeploymentResult, DeploymentStrategy, ResultBuilder, StrategyContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryConfig {
    /// How long the canary bakes before its health decides the promotion.
    pub soak_time: Duration,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self { soak_time: Duration::from_secs(30) }
    }
}

/// Deploy to a single canary node, soak, verify health, then promote via the
/// rolling batch loop. An unhealthy canary aborts with the rest of the fleet
/// untouched.
#[derive(Debug, Default, Clone)]
pub struct CanaryStrategy;

#[async_trait]
impl DeploymentStrategy for CanaryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Canary
    }

    fn name(&self) -> &'static str {
        "canary"
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

        let canary = &cluster.nodes()[0];
        let canary_id = canary.node_id();

        let baseline = match &ctx.stabilization {
            Some((service, _)) => Some(service.baseline(&[canary_id]).await?),
            None => None,
        };

        let mut node_results =
            deploy_all(std::slice::from_ref(canary), &request.module, &ctx.cancel).await;
        if ctx.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        if node_results.iter().any(|r| !r.success) {
            warn!(execution_id = %request.execution_id, canary = %canary_id, "canary deploy failed");
            return Ok(result.finish(
                false,
                "Canary deployment failed; fleet untouched",
                node_results,
            ));
        }

        if let (Some((service, config)), Some(baseline)) = (&ctx.stabilization, baseline) {
            let stab = service
                .wait_for_stabilization(&[canary_id], &baseline, config, &ctx.cancel)
                .await?;
            if !stab.is_stable {
                return Ok(result.finish(
                    false,
                    format!(
                        "Canary did not stabilize within {:?}; fleet untouched",
                        config.maximum_wait
                    ),
                    node_results,
                ));
            }
        }

        cancellable_sleep(ctx.canary.soak_time, &ctx.cancel).await?;

        if !canary.probe_health().await {
            warn!(execution_id = %request.execution_id, canary = %canary_id, "canary unhealthy after soak");
            return Ok(result.finish(
                false,
                "Canary node unhealthy after soak; fleet untouched",
                node_results,
            ));
        }

        // Promote: roll the remainder in batches.
        let remainder = &cluster.nodes()[1..];
        if !remainder.is_empty() {
            let outcome =
                run_batches(remainder, &request.module, &ctx.rolling, &ctx.cancel).await?;
            node_results.extend(outcome.node_results);
            if let Some(reason) = outcome.aborted {
                return Ok(result.finish(
                    false,
                    format!("Canary promotion aborted: {}", reason),
                    node_results,
                ));
            }
        }

        let failed = node_results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            return Ok(result.finish(
                false,
                format!("Canary promotion finished with {} failed node(s)", failed),
                node_results,
            ));
        }

        info!(
            execution_id = %request.execution_id,
            nodes = node_results.len(),
            "canary promoted to full fleet"
        );
        let deployed = node_results.len();
        Ok(result.finish(
            true,
            format!("Canary promoted: deployed to {} node(s)", deployed),
            node_results,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FailureMode, KernelNode};
    use hoist_domain::{Environment, Module, ModuleVersion};

    fn request() -> DeploymentRequest {
        DeploymentRequest::new(
            Module::new("billing", ModuleVersion::new(3, 0, 0)).unwrap(),
            Environment::Production,
            StrategyKind::Canary,
            "dev@example.com",
        )
    }

    fn cluster(n: usize) -> EnvironmentCluster {
        let mut cluster = EnvironmentCluster::new(Environment::Production);
        for i in 0..n {
            cluster
                .add_node(KernelNode::new(format!("node-{i}"), 9000, Environment::Production))
                .unwrap();
        }
        cluster
    }

    fn fast_ctx() -> StrategyContext {
        StrategyContext {
            canary: CanaryConfig { soak_time: Duration::from_millis(5) },
            ..StrategyContext::default()
        }
    }

    #[tokio::test]
    async fn healthy_canary_promotes_the_fleet() {
        let cluster = cluster(5);
        let result = CanaryStrategy.execute(&request(), &cluster, &fast_ctx()).await.unwrap();

        assert!(result.success, "{}", result.message);
        assert_eq!(result.nodes_deployed(), 5);
        assert!(result.message.contains("Canary promoted"));
    }

    #[tokio::test]
    async fn unhealthy_canary_leaves_fleet_untouched() {
        let cluster = cluster(5);
        cluster.nodes()[0].set_failure_mode(FailureMode::ReportUnhealthy).await;

        let result = CanaryStrategy.execute(&request(), &cluster, &fast_ctx()).await.unwrap();

        assert!(!result.success);
        assert!(result.message.contains("unhealthy after soak"));
        assert_eq!(result.node_results.len(), 1, "only the canary was touched");
        for node in &cluster.nodes()[1..] {
            assert!(node.current_module().await.is_none());
        }
    }

    #[tokio::test]
    async fn failed_canary_deploy_aborts() {
        let cluster = cluster(3);
        cluster.nodes()[0].set_failure_mode(FailureMode::FailDeploy).await;

        let result = CanaryStrategy.execute(&request(), &cluster, &fast_ctx()).await.unwrap();

        assert!(!result.success);
        assert!(result.message.contains("Canary deployment failed"));
        assert!(cluster.nodes()[1].current_module().await.is_none());
    }

    #[tokio::test]
    async fn single_node_cluster_promotes_nothing() {
        let cluster = cluster(1);
        let result = CanaryStrategy.execute(&request(), &cluster, &fast_ctx()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.nodes_deployed(), 1);
    }
}

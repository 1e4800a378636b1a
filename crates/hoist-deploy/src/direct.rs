use async_trait::async_trait;
use hoist_domain::{DeploymentRequest, StrategyKind};
use tracing::info;

use crate::cluster::EnvironmentCluster;
use crate::error::DeployError;
use crate::strategy::{
    deploy_all, DeploymentResult, DeploymentStrategy, ResultBuilder, StrategyContext,
};

/// Parallel deploy to every node with no smoke test and no stabilization.
/// Success requires every node deploy to succeed.
#[derive(Debug, Default, Clone)]
pub struct DirectStrategy;

#[async_trait]
impl DeploymentStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn name(&self) -> &'static str {
        "direct"
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

        let node_results = deploy_all(cluster.nodes(), &request.module, &ctx.cancel).await;
        if ctx.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let failed = node_results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            return Ok(result.finish(
                false,
                format!("Direct deployment failed: {} node(s)", failed),
                node_results,
            ));
        }

        info!(
            execution_id = %request.execution_id,
            nodes = node_results.len(),
            "direct deployment complete"
        );
        let deployed = node_results.len();
        Ok(result.finish(
            true,
            format!("Successfully deployed to {} node(s) using direct strategy", deployed),
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
            Module::new("billing", ModuleVersion::new(1, 0, 0)).unwrap(),
            Environment::Staging,
            StrategyKind::Direct,
            "dev@example.com",
        )
    }

    fn cluster(n: usize) -> EnvironmentCluster {
        let mut cluster = EnvironmentCluster::new(Environment::Staging);
        for i in 0..n {
            cluster
                .add_node(KernelNode::new(format!("node-{i}"), 9000, Environment::Staging))
                .unwrap();
        }
        cluster
    }

    #[tokio::test]
    async fn deploys_all_nodes() {
        let cluster = cluster(4);
        let result = DirectStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.nodes_deployed(), 4);
        assert_eq!(result.nodes_failed(), 0);
        assert_eq!(result.strategy, StrategyKind::Direct);
    }

    #[tokio::test]
    async fn any_node_failure_fails_the_run() {
        let cluster = cluster(3);
        cluster.nodes()[1].set_failure_mode(FailureMode::FailDeploy).await;

        let result = DirectStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.nodes_deployed(), 2);
        assert_eq!(result.nodes_failed(), 1);
    }

    #[tokio::test]
    async fn empty_cluster_fails() {
        let cluster = cluster(0);
        let result = DirectStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "No nodes available");
    }
}

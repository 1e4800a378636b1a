use async_trait::async_trait;
use hoist_domain::{DeploymentRequest, StrategyKind};
use tracing::{info, warn};

use crate::cluster::EnvironmentCluster;
use crate::error::DeployError;
use crate::strategy::{
    deploy_all, smoke_test, DeploymentResult, DeploymentStrategy, ResultBuilder, StrategyContext,
};

/// Deploy to the whole fleet (the "green" side), gate on stabilization and
/// smoke tests, and only then let traffic switch. Any gate failure leaves
/// green running but traffic on blue.
#[derive(Debug, Default, Clone)]
pub struct BlueGreenStrategy;

#[async_trait]
impl DeploymentStrategy for BlueGreenStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BlueGreen
    }

    fn name(&self) -> &'static str {
        "blue-green"
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

        // Baseline must be captured before the deploy disturbs the fleet.
        let baseline = match &ctx.stabilization {
            Some((service, _)) => Some(service.baseline(&cluster.node_ids()).await?),
            None => None,
        };

        let node_results = deploy_all(cluster.nodes(), &request.module, &ctx.cancel).await;
        if ctx.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let failed = node_results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(
                execution_id = %request.execution_id,
                failed,
                "green deployment failed; traffic stays on blue"
            );
            return Ok(result.finish(
                false,
                format!("Deployment to green environment failed: {} node(s)", failed),
                node_results,
            ));
        }

        if let (Some((service, config)), Some(baseline)) = (&ctx.stabilization, baseline) {
            let stab = service
                .wait_for_stabilization(&cluster.node_ids(), &baseline, config, &ctx.cancel)
                .await?;
            if !stab.is_stable {
                return Ok(result.finish(
                    false,
                    format!(
                        "Green environment did not stabilize within {:?} ({} checks). Not switching traffic",
                        config.maximum_wait, stab.total_checks
                    ),
                    node_results,
                ));
            }
        }

        match smoke_test(cluster.nodes(), ctx.smoke_test_timeout).await {
            Some(0) => {}
            _ => {
                // Unhealthy nodes or probe timeout; either way the switch is off.
                return Ok(result.finish(
                    false,
                    "Smoke tests failed. Traffic remains on blue environment",
                    node_results,
                ));
            }
        }

        info!(
            execution_id = %request.execution_id,
            nodes = node_results.len(),
            "blue-green deployment complete; traffic switched"
        );
        let deployed = node_results.len();
        Ok(result.finish(
            true,
            format!("Successfully deployed to {} node(s) using blue-green strategy", deployed),
            node_results,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ClusterMetrics, MetricsProvider, NodeMetrics};
    use crate::node::{FailureMode, KernelNode};
    use crate::stabilize::{ResourceStabilizationService, StabilizationConfig};
    use async_trait::async_trait;
    use hoist_domain::{Environment, Module, ModuleVersion, NodeId, NodeState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn request() -> DeploymentRequest {
        DeploymentRequest::new(
            Module::new("billing", ModuleVersion::new(2, 0, 0)).unwrap(),
            Environment::Production,
            StrategyKind::BlueGreen,
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

    #[tokio::test]
    async fn all_healthy_switches_traffic() {
        let cluster = cluster(3);
        let result = BlueGreenStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.nodes_deployed(), 3);
        assert!(result.message.contains("blue-green"));
        for node in cluster.nodes() {
            assert_eq!(node.state().await, NodeState::Healthy);
        }
    }

    #[tokio::test]
    async fn empty_cluster_fails() {
        let cluster = cluster(0);
        let result = BlueGreenStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "No nodes available");
    }

    #[tokio::test]
    async fn node_failure_keeps_traffic_on_blue() {
        let cluster = cluster(3);
        cluster.nodes()[2].set_failure_mode(FailureMode::FailDeploy).await;

        let result = BlueGreenStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.message.contains("green environment failed: 1 node(s)"));
    }

    #[tokio::test]
    async fn unhealthy_smoke_test_keeps_traffic_on_blue() {
        let cluster = cluster(2);
        cluster.nodes()[0].set_failure_mode(FailureMode::ReportUnhealthy).await;

        let result = BlueGreenStrategy
            .execute(&request(), &cluster, &StrategyContext::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.message.contains("Traffic remains on blue"));
        // Green nodes remain deployed
        assert_eq!(result.nodes_deployed(), 2);
    }

    /// Oscillates CPU ±15% around the 50% baseline after the first call.
    struct OscillatingMetrics {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricsProvider for OscillatingMetrics {
        async fn cluster_metrics(&self, _env: Environment) -> Result<ClusterMetrics, DeployError> {
            unimplemented!("not used")
        }

        async fn nodes_metrics(&self, ids: &[NodeId]) -> Result<Vec<NodeMetrics>, DeployError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let cpu = if i == 0 {
                50.0 // baseline snapshot
            } else if i % 2 == 0 {
                57.5
            } else {
                42.5
            };
            Ok(ids
                .iter()
                .map(|_| NodeMetrics { cpu_percent: cpu, memory_percent: 40.0, latency_ms: 10.0 })
                .collect())
        }
    }

    #[tokio::test]
    async fn stabilization_timeout_keeps_traffic_on_blue() {
        let cluster = cluster(5);
        let service = Arc::new(ResourceStabilizationService::new(Arc::new(
            OscillatingMetrics { calls: AtomicUsize::new(0) },
        )));
        let config = StabilizationConfig {
            cpu_delta_percent: 10.0,
            memory_delta_percent: 10.0,
            latency_delta_percent: 20.0,
            polling_interval: Duration::from_millis(5),
            consecutive_stable_checks: 3,
            minimum_wait: Duration::from_millis(0),
            maximum_wait: Duration::from_millis(60),
        };
        let ctx = StrategyContext {
            stabilization: Some((service, config)),
            ..StrategyContext::default()
        };

        let result = BlueGreenStrategy.execute(&request(), &cluster, &ctx).await.unwrap();

        assert!(!result.success);
        assert!(result.message.contains("did not stabilize"));
        assert!(result.message.contains("Not switching traffic"));
        // Green nodes remain running even though traffic stayed on blue
        assert_eq!(result.nodes_deployed(), 5);
        for node in cluster.nodes() {
            assert_eq!(node.state().await, NodeState::Healthy);
        }
    }
}

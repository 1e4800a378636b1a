use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hoist_deploy::{
    CanaryConfig, ClusterSet, DeployError, DeploymentResult, EnvironmentCluster,
    ResourceStabilizationService, RollingConfig, StabilizationConfig, StrategyContext,
    StrategyRegistry,
};
use hoist_domain::{DeploymentRequest, ExecutionId, Module, NodeId, StrategyKind};
use hoist_store::{ExecutionState, ExecutionStatus, StageResult, StageStatus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::tracker::{ApprovalDecision, DeploymentTracker};

const STAGE_VALIDATE: &str = "Validate";
const STAGE_APPROVAL: &str = "ApprovalGate";
const STAGE_PRE_HEALTH: &str = "PreDeployHealth";
const STAGE_DEPLOY: &str = "Deploy";
const STAGE_STABILIZE: &str = "Stabilize";
const STAGE_VERIFY: &str = "Verify";
const STAGE_COMMIT: &str = "Commit";
const STAGE_ROLLBACK: &str = "Rollback";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub approval_timeout: Duration,
    /// Verify passes when at least this fraction of the cluster is healthy.
    pub min_healthy_fraction: f64,
    pub smoke_test_timeout: Duration,
    /// `None` disables stabilization everywhere.
    pub stabilization: Option<StabilizationConfig>,
    pub rolling: RollingConfig,
    pub canary: CanaryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            approval_timeout: Duration::from_secs(15 * 60),
            min_healthy_fraction: 0.5,
            smoke_test_timeout: Duration::from_secs(5 * 60),
            stabilization: Some(StabilizationConfig::default()),
            rolling: RollingConfig::default(),
            canary: CanaryConfig::default(),
        }
    }
}

/// End-to-end deployment pipeline:
/// Validate → ApprovalGate → PreDeployHealth → Deploy → Stabilize → Verify →
/// Commit, with Rollback on any post-deploy failure.
///
/// Stages within one execution are strictly sequential; different executions
/// share the pipeline and run concurrently. Every stage boundary persists
/// state through the tracker, so observers always see the latest stage.
pub struct DeploymentPipeline {
    tracker: Arc<DeploymentTracker>,
    strategies: Arc<StrategyRegistry>,
    clusters: Arc<ClusterSet>,
    stabilization: Arc<ResourceStabilizationService>,
    config: PipelineConfig,
}

impl DeploymentPipeline {
    pub fn new(
        tracker: Arc<DeploymentTracker>,
        strategies: Arc<StrategyRegistry>,
        clusters: Arc<ClusterSet>,
        stabilization: Arc<ResourceStabilizationService>,
        config: PipelineConfig,
    ) -> Self {
        Self { tracker, strategies, clusters, stabilization, config }
    }

    pub fn tracker(&self) -> &Arc<DeploymentTracker> {
        &self.tracker
    }

    /// Run the pipeline in the background and return the execution id
    /// immediately. Failures are recorded in the tracker.
    pub fn spawn(self: &Arc<Self>, request: DeploymentRequest) -> ExecutionId {
        let id = request.execution_id;
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run(request).await {
                error!(execution_id = %id, error = %e, "pipeline execution aborted");
            }
        });
        id
    }

    /// Run the full pipeline to completion. Operational failures end in a
    /// terminal execution status; `Err` means the tracker store itself failed.
    pub async fn run(&self, request: DeploymentRequest) -> Result<ExecutionState, PipelineError> {
        let id = request.execution_id;
        let cancel = CancellationToken::new();
        self.tracker.register_cancel(id, cancel.clone()).await;
        let result = self.run_inner(request, &cancel).await;
        self.tracker.remove_cancel(&id).await;
        result
    }

    async fn run_inner(
        &self,
        request: DeploymentRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, PipelineError> {
        let mut state = ExecutionState::new(request.clone());
        self.tracker.save(&state).await?;
        info!(
            execution_id = %state.execution_id,
            module = %request.module.name,
            version = %request.module.version,
            environment = %request.target_environment,
            strategy = %request.strategy,
            "pipeline started"
        );

        // ── Validate ──────────────────────────────────────────────────────────
        state.push_stage(StageResult::running(STAGE_VALIDATE));
        if let Err(reason) = self.validate(&request) {
            finish_last(&mut state, StageStatus::Failed, format!("Validate failed: {reason}"));
            return self.conclude(state, ExecutionStatus::Failed).await;
        }
        finish_last(&mut state, StageStatus::Succeeded, "request valid");
        self.tracker.save(&state).await?;

        // ── ApprovalGate ──────────────────────────────────────────────────────
        if request.require_approval {
            state.push_stage(StageResult::running(STAGE_APPROVAL));
            state.set_status(ExecutionStatus::PendingApproval);
            self.tracker.save(&state).await?;

            let decision = self
                .tracker
                .wait_for_approval(state.execution_id, self.config.approval_timeout, cancel)
                .await;
            match decision {
                ApprovalDecision::Approved => {
                    state.set_status(ExecutionStatus::Running);
                    finish_last(&mut state, StageStatus::Succeeded, "approved");
                }
                ApprovalDecision::Rejected => {
                    finish_last(
                        &mut state,
                        StageStatus::Failed,
                        "ApprovalGate failed: rejected by approver",
                    );
                    return self.conclude(state, ExecutionStatus::Failed).await;
                }
                ApprovalDecision::TimedOut => {
                    finish_last(
                        &mut state,
                        StageStatus::Failed,
                        "ApprovalGate failed: approval timed out",
                    );
                    return self.conclude(state, ExecutionStatus::Failed).await;
                }
                ApprovalDecision::Cancelled => {
                    finish_last(&mut state, StageStatus::Failed, "cancelled while pending approval");
                    return self.conclude(state, ExecutionStatus::Cancelled).await;
                }
            }
        } else {
            state.push_stage(StageResult::skipped(STAGE_APPROVAL, "approval not required"));
        }
        self.tracker.save(&state).await?;

        // ── PreDeployHealth ───────────────────────────────────────────────────
        state.push_stage(StageResult::running(STAGE_PRE_HEALTH));
        let Some(cluster) = self.clusters.get(request.target_environment) else {
            finish_last(
                &mut state,
                StageStatus::Failed,
                format!(
                    "PreDeployHealth failed: no cluster configured for {}",
                    request.target_environment
                ),
            );
            return self.conclude(state, ExecutionStatus::Failed).await;
        };
        let health = cluster.cluster_health().await;
        if health.healthy_nodes < 1 {
            finish_last(
                &mut state,
                StageStatus::Failed,
                "PreDeployHealth failed: no healthy nodes available",
            );
            return self.conclude(state, ExecutionStatus::Failed).await;
        }
        finish_last(
            &mut state,
            StageStatus::Succeeded,
            format!("{}/{} nodes healthy", health.healthy_nodes, health.total_nodes),
        );
        self.tracker.save(&state).await?;

        if cancel.is_cancelled() {
            return self.conclude(state, ExecutionStatus::Cancelled).await;
        }

        // Blue-green and canary run their own stabilization gate; the
        // pipeline-level Stabilize stage covers the rest.
        let strategy_stabilizes =
            matches!(request.strategy, StrategyKind::BlueGreen | StrategyKind::Canary);

        // Snapshots taken before the deploy disturbs anything.
        let mut rollback_snapshot: HashMap<NodeId, Option<Module>> = HashMap::new();
        for node in cluster.nodes() {
            rollback_snapshot.insert(node.node_id(), node.current_module().await);
        }
        let baseline = match (&self.config.stabilization, strategy_stabilizes) {
            (Some(_), false) => match self.stabilization.baseline(&cluster.node_ids()).await {
                Ok(b) => Some(b),
                Err(e) => {
                    warn!(execution_id = %state.execution_id, error = %e, "baseline capture failed");
                    None
                }
            },
            _ => None,
        };

        // ── Deploy ────────────────────────────────────────────────────────────
        state.push_stage(StageResult::running(STAGE_DEPLOY));
        let strategy = match self.strategies.for_kind(request.strategy) {
            Ok(s) => s,
            Err(e) => {
                finish_last(&mut state, StageStatus::Failed, format!("Deploy failed: {e}"));
                return self.conclude(state, ExecutionStatus::Failed).await;
            }
        };
        let ctx = StrategyContext {
            stabilization: if strategy_stabilizes {
                self.config
                    .stabilization
                    .clone()
                    .map(|c| (self.stabilization.clone(), c))
            } else {
                None
            },
            smoke_test_timeout: self.config.smoke_test_timeout,
            rolling: self.config.rolling,
            canary: self.config.canary,
            cancel: cancel.clone(),
        };
        let deploy_result = match strategy.execute(&request, &cluster, &ctx).await {
            Ok(result) => result,
            Err(DeployError::Cancelled) => {
                finish_last(&mut state, StageStatus::Failed, "Deploy cancelled");
                return self.conclude(state, ExecutionStatus::Cancelled).await;
            }
            Err(e) => {
                finish_last(&mut state, StageStatus::Failed, format!("Deploy failed: {e}"));
                return self.conclude(state, ExecutionStatus::Failed).await;
            }
        };
        if let Some(stage) = state.last_stage_mut() {
            stage.strategy = Some(request.strategy);
            stage.nodes_deployed = deploy_result.nodes_deployed();
            stage.nodes_failed = deploy_result.nodes_failed();
        }
        if deploy_result.success {
            finish_last(&mut state, StageStatus::Succeeded, deploy_result.message.clone());
        } else {
            finish_last(
                &mut state,
                StageStatus::Failed,
                format!("Deploy failed: {}", deploy_result.message),
            );
            self.tracker.save(&state).await?;
            return self
                .rollback(state, &cluster, &rollback_snapshot, &deploy_result, cancel)
                .await;
        }
        self.tracker.save(&state).await?;

        // ── Stabilize ─────────────────────────────────────────────────────────
        if strategy_stabilizes {
            state.push_stage(StageResult::skipped(
                STAGE_STABILIZE,
                "handled by the deployment strategy",
            ));
        } else if self.config.stabilization.is_none() {
            state.push_stage(StageResult::skipped(STAGE_STABILIZE, "stabilization not configured"));
        } else if let Some(baseline) = baseline {
            state.push_stage(StageResult::running(STAGE_STABILIZE));
            // Only nodes that actually took the new module are watched.
            let deployed_ids: Vec<NodeId> = deploy_result
                .node_results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.node_id)
                .collect();
            let stab_config = self.config.stabilization.clone().unwrap_or_default();
            match self
                .stabilization
                .wait_for_stabilization(&deployed_ids, &baseline, &stab_config, cancel)
                .await
            {
                Ok(result) if result.is_stable => {
                    finish_last(
                        &mut state,
                        StageStatus::Succeeded,
                        format!("stable after {} check(s)", result.total_checks),
                    );
                }
                Ok(_) => {
                    finish_last(
                        &mut state,
                        StageStatus::Failed,
                        format!(
                            "Stabilize failed: metrics did not settle within {:?}",
                            stab_config.maximum_wait
                        ),
                    );
                    self.tracker.save(&state).await?;
                    return self
                        .rollback(state, &cluster, &rollback_snapshot, &deploy_result, cancel)
                        .await;
                }
                Err(DeployError::Cancelled) => {
                    finish_last(&mut state, StageStatus::Failed, "Stabilize cancelled");
                    return self.conclude(state, ExecutionStatus::Cancelled).await;
                }
                Err(e) => {
                    finish_last(&mut state, StageStatus::Failed, format!("Stabilize failed: {e}"));
                    self.tracker.save(&state).await?;
                    return self
                        .rollback(state, &cluster, &rollback_snapshot, &deploy_result, cancel)
                        .await;
                }
            }
        } else {
            state.push_stage(StageResult::skipped(STAGE_STABILIZE, "baseline unavailable"));
        }
        self.tracker.save(&state).await?;

        // ── Verify ────────────────────────────────────────────────────────────
        state.push_stage(StageResult::running(STAGE_VERIFY));
        let health = cluster.cluster_health().await;
        if health.healthy_fraction() < self.config.min_healthy_fraction {
            finish_last(
                &mut state,
                StageStatus::Failed,
                format!(
                    "Verify failed: only {}/{} nodes healthy",
                    health.healthy_nodes, health.total_nodes
                ),
            );
            self.tracker.save(&state).await?;
            return self
                .rollback(state, &cluster, &rollback_snapshot, &deploy_result, cancel)
                .await;
        }
        finish_last(
            &mut state,
            StageStatus::Succeeded,
            format!("{}/{} nodes healthy", health.healthy_nodes, health.total_nodes),
        );
        self.tracker.save(&state).await?;

        // ── Commit ────────────────────────────────────────────────────────────
        let mut commit = StageResult::running(STAGE_COMMIT);
        commit.finish(StageStatus::Succeeded, "deployment committed");
        state.push_stage(commit);
        info!(execution_id = %state.execution_id, "pipeline succeeded");
        self.conclude(state, ExecutionStatus::Succeeded).await
    }

    /// Redeploy the snapshot module on every node this execution touched.
    async fn rollback(
        &self,
        mut state: ExecutionState,
        cluster: &EnvironmentCluster,
        snapshot: &HashMap<NodeId, Option<Module>>,
        deploy_result: &DeploymentResult,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, PipelineError> {
        let mut stage = StageResult::running(STAGE_ROLLBACK);
        let mut attempted = 0u32;
        let mut restored = 0u32;
        let mut failed = 0u32;

        for result in &deploy_result.node_results {
            let Some(node) = cluster.node(result.node_id) else { continue };
            let Some(previous) = snapshot.get(&result.node_id).cloned().flatten() else {
                continue; // first deploy on this node, nothing to restore
            };
            attempted += 1;
            let rollback_result = node.deploy(&previous, cancel).await;
            if rollback_result.success {
                restored += 1;
            } else {
                failed += 1;
                warn!(
                    execution_id = %state.execution_id,
                    node_id = %result.node_id,
                    message = %rollback_result.message,
                    "rollback deploy failed"
                );
            }
        }

        if attempted == 0 {
            stage.finish(StageStatus::Skipped, "no previous module version to restore");
            state.push_stage(stage);
            return self.conclude(state, ExecutionStatus::Failed).await;
        }

        stage.nodes_deployed = restored;
        stage.nodes_failed = failed;
        if failed == 0 {
            stage.finish(
                StageStatus::Succeeded,
                format!("restored previous module on {} node(s)", restored),
            );
            state.push_stage(stage);
            info!(execution_id = %state.execution_id, restored, "rollback complete");
            self.conclude(state, ExecutionStatus::RolledBack).await
        } else {
            stage.finish(
                StageStatus::Failed,
                format!("Rollback failed: {} of {} node(s) could not be restored", failed, attempted),
            );
            state.push_stage(stage);
            self.conclude(state, ExecutionStatus::Failed).await
        }
    }

    /// Roll a committed execution back by submitting a new pipeline run that
    /// deploys the previous module version recorded in node history.
    pub async fn rollback_execution(
        &self,
        id: &ExecutionId,
    ) -> Result<ExecutionState, PipelineError> {
        let state = self
            .tracker
            .get_state(id)
            .await?
            .ok_or(PipelineError::ExecutionNotFound(*id))?;
        if !state.status.is_terminal() {
            return Err(PipelineError::Validation(
                "execution still in progress; cancel it first".to_string(),
            ));
        }

        let environment = state.request.target_environment;
        let cluster = self
            .clusters
            .get(environment)
            .ok_or(PipelineError::NoCluster(environment))?;

        let mut previous: Option<Module> = None;
        for node in cluster.nodes() {
            let history = node.history().await;
            if history.len() >= 2 {
                let record = &history[history.len() - 2];
                previous = Some(
                    Module::new(record.module_name.clone(), record.version)
                        .map_err(|e| PipelineError::Validation(e.to_string()))?,
                );
                break;
            }
        }
        let previous = previous.ok_or_else(|| {
            PipelineError::Validation("no previous module version recorded".to_string())
        })?;

        let mut request = DeploymentRequest::new(
            previous,
            environment,
            StrategyKind::Direct,
            state.request.requester_email.clone(),
        );
        request.metadata.insert("rollback_of".to_string(), id.to_string());
        info!(
            rollback_of = %id,
            execution_id = %request.execution_id,
            module = %request.module.name,
            version = %request.module.version,
            "manual rollback submitted"
        );
        self.run(request).await
    }

    async fn conclude(
        &self,
        mut state: ExecutionState,
        status: ExecutionStatus,
    ) -> Result<ExecutionState, PipelineError> {
        state.set_status(status);
        self.tracker.save(&state).await?;
        Ok(state)
    }

    fn validate(&self, request: &DeploymentRequest) -> Result<(), String> {
        if request.module.name.trim().is_empty() {
            return Err("module name must not be empty".to_string());
        }
        if request.requester_email.trim().is_empty() {
            return Err("requester email must not be empty".to_string());
        }
        if self.strategies.for_kind(request.strategy).is_err() {
            return Err(format!("no strategy registered for {}", request.strategy));
        }
        Ok(())
    }
}

fn finish_last(state: &mut ExecutionState, status: StageStatus, message: impl Into<String>) {
    if let Some(stage) = state.last_stage_mut() {
        stage.finish(status, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_deploy::{
        BlueGreenStrategy, CanaryStrategy, DirectStrategy, EnvironmentCluster, FailureMode,
        KernelNode, NodeMetrics, RollingStrategy, StaticMetricsProvider,
    };
    use hoist_domain::{Environment, ModuleVersion};
    use hoist_store::InMemoryTracker;

    struct Harness {
        pipeline: Arc<DeploymentPipeline>,
        tracker: Arc<DeploymentTracker>,
        clusters: Arc<ClusterSet>,
    }

    fn harness(nodes: usize, config: PipelineConfig) -> Harness {
        let tracker = Arc::new(DeploymentTracker::new(Arc::new(InMemoryTracker::new())));

        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(DirectStrategy));
        registry.register(Arc::new(RollingStrategy));
        registry.register(Arc::new(CanaryStrategy));
        registry.register(Arc::new(BlueGreenStrategy));

        let mut cluster = EnvironmentCluster::new(Environment::Staging);
        for i in 0..nodes {
            cluster
                .add_node(KernelNode::new(format!("node-{i}"), 9000, Environment::Staging))
                .unwrap();
        }
        let mut clusters = ClusterSet::new();
        clusters.insert(cluster);
        let clusters = Arc::new(clusters);

        let metrics = Arc::new(StaticMetricsProvider::new(NodeMetrics::default()));
        let stabilization = Arc::new(ResourceStabilizationService::new(metrics));

        let pipeline = Arc::new(DeploymentPipeline::new(
            tracker.clone(),
            Arc::new(registry),
            clusters.clone(),
            stabilization,
            config,
        ));
        Harness { pipeline, tracker, clusters }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            approval_timeout: Duration::from_millis(100),
            stabilization: None,
            ..PipelineConfig::default()
        }
    }

    fn request(strategy: StrategyKind, version: &str) -> DeploymentRequest {
        DeploymentRequest::new(
            Module::new("billing", ModuleVersion::parse(version).unwrap()).unwrap(),
            Environment::Staging,
            strategy,
            "dev@example.com",
        )
    }

    fn stage_statuses(state: &ExecutionState) -> Vec<(&str, StageStatus)> {
        state
            .stages
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect()
    }

    #[tokio::test]
    async fn direct_deploy_runs_all_stages() {
        let h = harness(3, fast_config());
        let state = h.pipeline.run(request(StrategyKind::Direct, "1.0.0")).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Succeeded);
        assert_eq!(
            stage_statuses(&state),
            vec![
                (STAGE_VALIDATE, StageStatus::Succeeded),
                (STAGE_APPROVAL, StageStatus::Skipped),
                (STAGE_PRE_HEALTH, StageStatus::Succeeded),
                (STAGE_DEPLOY, StageStatus::Succeeded),
                (STAGE_STABILIZE, StageStatus::Skipped),
                (STAGE_VERIFY, StageStatus::Succeeded),
                (STAGE_COMMIT, StageStatus::Succeeded),
            ]
        );
        let deploy = &state.stages[3];
        assert_eq!(deploy.strategy, Some(StrategyKind::Direct));
        assert_eq!(deploy.nodes_deployed, 3);
        assert_eq!(deploy.nodes_failed, 0);
    }

    #[tokio::test]
    async fn rolling_ten_nodes_batch_three() {
        let mut config = fast_config();
        config.rolling = RollingConfig { batch_size: Some(3), failure_threshold: 0 };
        let h = harness(10, config);

        let state = h.pipeline.run(request(StrategyKind::Rolling, "1.0.0")).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Succeeded);
        let deploy = state.stages.iter().find(|s| s.name == STAGE_DEPLOY).unwrap();
        assert_eq!(deploy.nodes_deployed, 10);
        assert_eq!(deploy.nodes_failed, 0);
        assert!(deploy.message.contains("4 batch(es)"));
    }

    #[tokio::test]
    async fn validation_failure_short_circuits() {
        let h = harness(2, fast_config());
        let mut req = request(StrategyKind::Direct, "1.0.0");
        req.module.name = String::new();

        let state = h.pipeline.run(req).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.stages.len(), 1);
        assert_eq!(state.stages[0].status, StageStatus::Failed);
        assert!(state.stages[0].message.contains("Validate failed"));
    }

    #[tokio::test]
    async fn approval_gate_blocks_then_approves() {
        let h = harness(2, PipelineConfig {
            approval_timeout: Duration::from_secs(5),
            stabilization: None,
            ..PipelineConfig::default()
        });
        let mut req = request(StrategyKind::Direct, "1.0.0");
        req.require_approval = true;
        let id = req.execution_id;

        let runner = {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.run(req).await })
        };

        // Wait until the execution parks at the gate
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(state) = h.tracker.get_state(&id).await.unwrap() {
                if state.status == ExecutionStatus::PendingApproval {
                    break;
                }
            }
        }
        assert!(h.tracker.signal_approval(&id, true).await, "gate must be armed");

        let state = runner.await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Succeeded);
        let approval = state.stages.iter().find(|s| s.name == STAGE_APPROVAL).unwrap();
        assert_eq!(approval.status, StageStatus::Succeeded);
    }

    #[tokio::test]
    async fn approval_timeout_fails_the_execution() {
        let h = harness(2, fast_config());
        let mut req = request(StrategyKind::Direct, "1.0.0");
        req.require_approval = true;

        let state = h.pipeline.run(req).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Failed);
        let approval = state.stages.iter().find(|s| s.name == STAGE_APPROVAL).unwrap();
        assert!(approval.message.contains("approval timed out"));
    }

    #[tokio::test]
    async fn rejection_fails_the_execution() {
        let h = harness(2, PipelineConfig {
            approval_timeout: Duration::from_secs(5),
            stabilization: None,
            ..PipelineConfig::default()
        });
        let mut req = request(StrategyKind::Direct, "1.0.0");
        req.require_approval = true;
        let id = req.execution_id;

        let runner = {
            let pipeline = h.pipeline.clone();
            tokio::spawn(async move { pipeline.run(req).await })
        };
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if h.tracker.signal_approval(&id, false).await {
                break;
            }
        }

        let state = runner.await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn failed_deploy_rolls_back_to_previous_version() {
        let h = harness(4, fast_config());

        // Seed version 1.0.0 everywhere
        let seeded = h.pipeline.run(request(StrategyKind::Direct, "1.0.0")).await.unwrap();
        assert_eq!(seeded.status, ExecutionStatus::Succeeded);

        // Second deploy aborts in the first batch
        let cluster = h.clusters.get(Environment::Staging).unwrap();
        cluster.nodes()[0].set_failure_mode(FailureMode::ReportUnhealthy).await;
        let mut config_req = request(StrategyKind::Rolling, "2.0.0");
        config_req.metadata.insert("attempt".into(), "2".into());

        let state = h.pipeline.run(config_req).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::RolledBack);
        let rollback = state.stages.iter().find(|s| s.name == STAGE_ROLLBACK).unwrap();
        assert_eq!(rollback.status, StageStatus::Succeeded);
        // Touched nodes are back on 1.0.0
        let node0 = &cluster.nodes()[0];
        assert_eq!(
            node0.current_module().await.unwrap().version,
            ModuleVersion::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn first_deploy_failure_has_nothing_to_restore() {
        let h = harness(2, fast_config());
        let cluster = h.clusters.get(Environment::Staging).unwrap();
        cluster.nodes()[0].set_failure_mode(FailureMode::FailDeploy).await;

        let state = h.pipeline.run(request(StrategyKind::Direct, "1.0.0")).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Failed);
        let rollback = state.stages.iter().find(|s| s.name == STAGE_ROLLBACK).unwrap();
        assert_eq!(rollback.status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn missing_cluster_fails_pre_deploy_health() {
        let h = harness(2, fast_config());
        let mut req = request(StrategyKind::Direct, "1.0.0");
        req.target_environment = Environment::Production;

        let state = h.pipeline.run(req).await.unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);
        let health = state.stages.iter().find(|s| s.name == STAGE_PRE_HEALTH).unwrap();
        assert!(health.message.contains("no cluster configured"));
    }

    #[tokio::test]
    async fn manual_rollback_submits_a_new_execution() {
        let h = harness(3, fast_config());
        h.pipeline.run(request(StrategyKind::Direct, "1.0.0")).await.unwrap();
        let second = h.pipeline.run(request(StrategyKind::Direct, "2.0.0")).await.unwrap();
        assert_eq!(second.status, ExecutionStatus::Succeeded);

        let rollback = h.pipeline.rollback_execution(&second.execution_id).await.unwrap();

        assert_eq!(rollback.status, ExecutionStatus::Succeeded);
        assert_ne!(rollback.execution_id, second.execution_id);
        assert_eq!(rollback.request.module.version, ModuleVersion::new(1, 0, 0));
        assert_eq!(
            rollback.request.metadata.get("rollback_of"),
            Some(&second.execution_id.to_string())
        );

        let cluster = h.clusters.get(Environment::Staging).unwrap();
        assert_eq!(
            cluster.nodes()[0].current_module().await.unwrap().version,
            ModuleVersion::new(1, 0, 0)
        );
    }

    #[tokio::test]
    async fn terminal_status_is_unique() {
        let h = harness(2, fast_config());
        let state = h.pipeline.run(request(StrategyKind::Direct, "1.0.0")).await.unwrap();
        assert!(state.status.is_terminal());

        // Re-reading from the tracker shows the same single terminal status
        let stored = h.tracker.get_result(&state.execution_id).await.unwrap().unwrap();
        assert_eq!(stored.status, state.status);
    }
}

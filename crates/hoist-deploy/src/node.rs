use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hoist_domain::{Environment, Module, ModuleVersion, NodeId, NodeState};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configurable failure injection for tests and chaos runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// `deploy` returns a failure result.
    FailDeploy,
    /// `deploy` succeeds but the next health probe reports unhealthy.
    ReportUnhealthy,
    /// `deploy` fails with exception-style detail in the message.
    ErrorDeploy,
}

/// Outcome of one per-node deploy call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDeployResult {
    pub node_id: NodeId,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// One entry in a node's deployment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub module_name: String,
    pub version: ModuleVersion,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct NodeInner {
    state: NodeState,
    current_module: Option<Module>,
    history: Vec<DeploymentRecord>,
    failure_mode: FailureMode,
}

/// The per-node deploy primitive. Cheap to clone; all clones share state.
///
/// A node is exclusively owned by one [`EnvironmentCluster`](crate::cluster::EnvironmentCluster);
/// everything else refers to it by `NodeId`.
#[derive(Debug, Clone)]
pub struct KernelNode {
    node_id: NodeId,
    hostname: String,
    port: u16,
    environment: Environment,
    /// Simulated module-swap latency per deploy.
    deploy_delay: Duration,
    inner: Arc<RwLock<NodeInner>>,
}

impl KernelNode {
    pub fn new(hostname: impl Into<String>, port: u16, environment: Environment) -> Self {
        Self {
            node_id: NodeId::new(),
            hostname: hostname.into(),
            port,
            environment,
            deploy_delay: Duration::from_millis(1),
            inner: Arc::new(RwLock::new(NodeInner {
                state: NodeState::Idle,
                current_module: None,
                history: Vec::new(),
                failure_mode: FailureMode::None,
            })),
        }
    }

    pub fn with_deploy_delay(mut self, delay: Duration) -> Self {
        self.deploy_delay = delay;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub async fn state(&self) -> NodeState {
        self.inner.read().await.state
    }

    pub async fn current_module(&self) -> Option<Module> {
        self.inner.read().await.current_module.clone()
    }

    pub async fn history(&self) -> Vec<DeploymentRecord> {
        self.inner.read().await.history.clone()
    }

    pub async fn set_failure_mode(&self, mode: FailureMode) {
        self.inner.write().await.failure_mode = mode;
    }

    /// Swap `module` onto this node.
    ///
    /// On success the node is Healthy, `current_module` is replaced, and the
    /// deployment history gains an entry. Cancellation aborts before anything
    /// is applied and leaves the node Idle.
    pub async fn deploy(&self, module: &Module, cancel: &CancellationToken) -> NodeDeployResult {
        let started = std::time::Instant::now();
        {
            let mut inner = self.inner.write().await;
            inner.state = NodeState::Deploying;
        }
        debug!(node_id = %self.node_id, module = %module.name, version = %module.version, "node deploy starting");

        tokio::select! {
            _ = cancel.cancelled() => {
                self.inner.write().await.state = NodeState::Idle;
                return NodeDeployResult {
                    node_id: self.node_id,
                    success: false,
                    message: "deployment cancelled".to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            _ = tokio::time::sleep(self.deploy_delay) => {}
        }

        let mut inner = self.inner.write().await;
        match inner.failure_mode {
            FailureMode::FailDeploy => {
                inner.state = NodeState::Failed;
                NodeDeployResult {
                    node_id: self.node_id,
                    success: false,
                    message: format!("deployment of {} {} failed", module.name, module.version),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            FailureMode::ErrorDeploy => {
                inner.state = NodeState::Failed;
                NodeDeployResult {
                    node_id: self.node_id,
                    success: false,
                    message: format!(
                        "deployment of {} {} raised: simulated module loader fault",
                        module.name, module.version
                    ),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            FailureMode::None | FailureMode::ReportUnhealthy => {
                inner.state = NodeState::Healthy;
                inner.current_module = Some(module.clone());
                inner.history.push(DeploymentRecord {
                    module_name: module.name.clone(),
                    version: module.version,
                    at: Utc::now(),
                });
                NodeDeployResult {
                    node_id: self.node_id,
                    success: true,
                    message: format!("deployed {} {}", module.name, module.version),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Liveness probe. A node in `ReportUnhealthy` mode flips to Unhealthy on
    /// its first probe after a deploy.
    pub async fn probe_health(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.failure_mode == FailureMode::ReportUnhealthy
            && inner.state == NodeState::Healthy
        {
            inner.state = NodeState::Unhealthy;
        }
        matches!(inner.state, NodeState::Healthy | NodeState::Idle)
    }

    /// Whether the node can take a deployment or serve traffic.
    pub async fn is_available(&self) -> bool {
        matches!(
            self.inner.read().await.state,
            NodeState::Healthy | NodeState::Idle
        )
    }
}

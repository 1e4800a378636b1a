use hoist_domain::{Environment, NodeId, StrategyKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no strategy configured for kind: {0}")]
    StrategyNotConfigured(StrategyKind),

    #[error("node {node} belongs to {node_env}, cluster is {cluster_env}")]
    EnvironmentMismatch {
        node: NodeId,
        node_env: Environment,
        cluster_env: Environment,
    },

    #[error("metrics fetch failed: {0}")]
    Metrics(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal deploy error: {0}")]
    Internal(String),
}

use hoist_deploy::DeployError;
use hoist_domain::{Environment, ExecutionId};
use hoist_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no cluster configured for environment: {0}")]
    NoCluster(Environment),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("execution already terminal: {0}")]
    AlreadyTerminal(ExecutionId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("deploy error: {0}")]
    Deploy(#[from] DeployError),

    #[error("operation cancelled")]
    Cancelled,
}

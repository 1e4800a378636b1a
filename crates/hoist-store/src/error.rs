use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Returned from `enqueue` when the queue is at capacity.
    #[error("queue full: capacity {capacity}")]
    QueueFull { capacity: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}

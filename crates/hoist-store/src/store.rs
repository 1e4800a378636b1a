use async_trait::async_trait;
use hoist_domain::{ExecutionId, Message, MessageId, TopicName};

use crate::error::StoreError;
use crate::state::ExecutionState;

/// Durable message store, keyed by message id with a topic index.
///
/// Treated as a linearisable external service; the broker persists every
/// published message here before it is enqueued.
#[async_trait]
pub trait PersistenceStore: Send + Sync + 'static {
    /// Upsert: storing a message that already exists replaces it.
    async fn store(&self, msg: &Message) -> Result<(), StoreError>;

    async fn retrieve(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Messages on `topic` in storage order, at most `limit`.
    async fn get_by_topic(&self, topic: &TopicName, limit: u32)
        -> Result<Vec<Message>, StoreError>;

    /// Returns false when the message did not exist.
    async fn delete(&self, id: &MessageId) -> Result<bool, StoreError>;
}

/// Ordered in-flight queue. The queue holds full message values but the
/// persistence store remains the source of truth for message state.
#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    async fn enqueue(&self, msg: Message) -> Result<(), StoreError>;

    /// The first `limit` messages in queue order, without removing them.
    async fn peek(&self, limit: u32) -> Result<Vec<Message>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Pull a specific message out of the queue (requeue and DLQ replay paths).
    /// Returns false when the message was not queued.
    async fn remove(&self, id: &MessageId) -> Result<bool, StoreError>;
}

/// Per-execution pipeline state, persisted at every stage boundary.
#[async_trait]
pub trait TrackerStore: Send + Sync + 'static {
    async fn get_execution(&self, id: &ExecutionId)
        -> Result<Option<ExecutionState>, StoreError>;

    async fn list_executions(&self) -> Result<Vec<ExecutionState>, StoreError>;

    async fn upsert_execution(&self, state: &ExecutionState) -> Result<(), StoreError>;
}

use hoist_domain::{DomainError, MessageId, SubscriptionId, TopicName};
use hoist_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("topic not found: {0}")]
    TopicNotFound(TopicName),

    #[error("topic already exists: {0}")]
    TopicExists(TopicName),

    #[error("topic type is immutable")]
    TopicTypeImmutable,

    #[error("partition count may not decrease ({current} → {requested})")]
    PartitionShrink { current: u32, requested: u32 },

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("operation cancelled")]
    Cancelled,
}

mod deploy;
mod error;
mod ids;
mod message;
mod schema;
mod tests;

pub use deploy::{
    DeploymentRequest, Environment, Module, ModuleVersion, NodeState, StrategyKind,
};
pub use error::DomainError;
pub use ids::{ExecutionId, MessageId, NodeId, SchemaId, SubscriptionId, TopicName};
pub use message::{
    DeliveryGuarantee, Message, MessageStatus, Subscription, SubscriptionFilter,
    SubscriptionType, Topic, TopicType, HIGH_PRIORITY_THRESHOLD, IDEMPOTENCY_KEY_HEADER,
    LOW_PRIORITY_THRESHOLD, MAX_PARTITIONS, MAX_PRIORITY,
};
pub use schema::{
    ApprovalRequest, ApprovalStatus, BreakingChange, BreakingChangeType, CompatibilityMode,
    MessageSchema, SchemaStatus,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("module name must not be empty")]
    EmptyModuleName,

    #[error("invalid module version: {0}")]
    InvalidVersion(String),

    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("invalid deployment strategy: {0}")]
    InvalidStrategy(String),

    #[error("topic name must not be empty")]
    EmptyTopicName,

    #[error("schema id must not be empty")]
    EmptySchemaId,

    #[error("message priority {0} out of range (0..=9)")]
    InvalidPriority(u8),

    #[error("partition count {0} out of range (1..=16)")]
    InvalidPartitionCount(u32),
}

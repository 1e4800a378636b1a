use hoist_domain::{SchemaId, SchemaStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema already registered: {0}")]
    Duplicate(SchemaId),

    #[error("schema not found: {0}")]
    NotFound(SchemaId),

    #[error("schema definition must not be blank")]
    EmptyDefinition,

    #[error("schema definition is not valid JSON: {0}")]
    InvalidDefinition(String),

    #[error("transition to {0} requires an actor")]
    MissingActor(SchemaStatus),

    #[error("illegal schema transition: {from} → {to}")]
    IllegalTransition { from: SchemaStatus, to: SchemaStatus },

    #[error("cannot delete schema in status {status}")]
    UnsafeDelete { status: SchemaStatus },

    #[error("approval requires a requester")]
    EmptyRequester,

    #[error("approval requires at least one approver")]
    EmptyApprovers,
}

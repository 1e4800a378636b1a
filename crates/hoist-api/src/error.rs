use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: msg.into() }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::SERVICE_UNAVAILABLE, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<hoist_domain::DomainError> for ApiError {
    fn from(e: hoist_domain::DomainError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<hoist_broker::BrokerError> for ApiError {
    fn from(e: hoist_broker::BrokerError) -> Self {
        use hoist_broker::BrokerError;
        match &e {
            BrokerError::TopicNotFound(_)
            | BrokerError::SubscriptionNotFound(_)
            | BrokerError::MessageNotFound(_) => ApiError::not_found(e.to_string()),
            BrokerError::TopicExists(_)
            | BrokerError::TopicTypeImmutable
            | BrokerError::PartitionShrink { .. } => ApiError::conflict(e.to_string()),
            BrokerError::Domain(_) => ApiError::bad_request(e.to_string()),
            BrokerError::Store(hoist_store::StoreError::QueueFull { .. }) => {
                ApiError::unavailable(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<hoist_schema::SchemaError> for ApiError {
    fn from(e: hoist_schema::SchemaError) -> Self {
        use hoist_schema::SchemaError;
        match &e {
            SchemaError::NotFound(_) => ApiError::not_found(e.to_string()),
            SchemaError::Duplicate(_)
            | SchemaError::IllegalTransition { .. }
            | SchemaError::UnsafeDelete { .. } => ApiError::conflict(e.to_string()),
            SchemaError::EmptyDefinition
            | SchemaError::InvalidDefinition(_)
            | SchemaError::MissingActor(_)
            | SchemaError::EmptyRequester
            | SchemaError::EmptyApprovers => ApiError::bad_request(e.to_string()),
        }
    }
}

impl From<hoist_pipeline::PipelineError> for ApiError {
    fn from(e: hoist_pipeline::PipelineError) -> Self {
        use hoist_pipeline::PipelineError;
        match &e {
            PipelineError::Validation(_) => ApiError::bad_request(e.to_string()),
            PipelineError::ExecutionNotFound(_) => ApiError::not_found(e.to_string()),
            PipelineError::AlreadyTerminal(_) | PipelineError::Cancelled => {
                ApiError::conflict(e.to_string())
            }
            PipelineError::NoCluster(_) => ApiError::unavailable(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<hoist_store::StoreError> for ApiError {
    fn from(e: hoist_store::StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

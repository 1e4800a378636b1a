use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use hoist_broker::TopicUpdate;
use hoist_domain::{
    CompatibilityMode, DeliveryGuarantee, DeploymentRequest, Environment, ExecutionId,
    MessageId, MessageSchema, Module, ModuleVersion, SchemaId, StrategyKind, Subscription,
    SubscriptionFilter, SubscriptionId, SubscriptionType, Topic, TopicName, TopicType,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.tracker.list().await?;
    Ok(StatusCode::OK)
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let executions = state.tracker.list().await?;
    let in_progress = executions.iter().filter(|e| !e.status.is_terminal()).count();
    let topics = state.broker.list_topics().await;

    let mut environments = Vec::new();
    for env in state.clusters.environments() {
        if let Some(cluster) = state.clusters.get(env) {
            let health = cluster.cluster_health().await;
            environments.push(json!({
                "environment": env,
                "health": health,
            }));
        }
    }

    Ok(Json(json!({
        "broker_health": state.broker_health.current_status().await,
        "topics": topics.len(),
        "executions": executions.len(),
        "executions_in_progress": in_progress,
        "environments": environments,
    })))
}

pub async fn broker_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": state.broker_health.current_status().await }))
}

// ── Deployments ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentBody {
    pub module_name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub environment: Environment,
    pub strategy: StrategyKind,
    pub requester_email: String,
    #[serde(default)]
    pub require_approval: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

pub async fn create_deployment(
    State(state): State<AppState>,
    Json(body): Json<CreateDeploymentBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let version = ModuleVersion::parse(&body.version)?;
    let mut module = Module::new(body.module_name, version)?;
    module.description = body.description;

    let mut request =
        DeploymentRequest::new(module, body.environment, body.strategy, body.requester_email);
    request.require_approval = body.require_approval;
    request.metadata = body.metadata;

    let execution_id = state.pipeline.spawn(request);
    Ok((StatusCode::CREATED, Json(json!({ "execution_id": execution_id }))))
}

pub async fn list_deployments(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let executions = state.tracker.list().await?;
    Ok(Json(json!(executions)))
}

pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ExecutionId::parse(&id)?;
    let execution = state
        .tracker
        .get_state(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("execution '{}' not found", id)))?;
    Ok(Json(json!(execution)))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    #[serde(default = "default_true")]
    pub approved: bool,
}

fn default_true() -> bool {
    true
}

pub async fn approve_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ApprovalBody>,
) -> Result<Json<Value>, ApiError> {
    let id = ExecutionId::parse(&id)?;
    if !state.tracker.signal_approval(&id, body.approved).await {
        return Err(ApiError::conflict(format!(
            "execution '{}' is not awaiting approval",
            id
        )));
    }
    Ok(Json(json!({ "signalled": true, "approved": body.approved })))
}

pub async fn cancel_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ExecutionId::parse(&id)?;
    if !state.tracker.cancel(&id).await {
        return Err(ApiError::conflict(format!(
            "execution '{}' is not running in this process",
            id
        )));
    }
    Ok(Json(json!({ "cancelled": true })))
}

pub async fn rollback_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ExecutionId::parse(&id)?;
    let execution = state.pipeline.rollback_execution(&id).await?;
    Ok(Json(json!(execution)))
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PublishBody {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

pub async fn publish_message(
    State(state): State<AppState>,
    Json(body): Json<PublishBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let topic = TopicName::new(body.topic)?;
    let message = state
        .broker
        .publish(&topic, body.payload, body.priority, body.headers)
        .await?;
    Ok((StatusCode::CREATED, Json(json!(message))))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = MessageId::parse(&id)?;
    let message = state
        .broker
        .get_message(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("message '{}' not found", id)))?;
    Ok(Json(json!(message)))
}

#[derive(Debug, Deserialize)]
pub struct TopicMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn get_topic_messages(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<TopicMessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let topic = TopicName::new(name)?;
    let messages = state.broker.get_by_topic(&topic, query.limit).await?;
    Ok(Json(json!(messages)))
}

pub async fn acknowledge_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = MessageId::parse(&id)?;
    if !state.broker.acknowledge(&id).await? {
        return Err(ApiError::not_found(format!("message '{}' not found", id)));
    }
    Ok(Json(json!({ "acknowledged": true })))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = MessageId::parse(&id)?;
    if !state.broker.delete_message(&id).await? {
        return Err(ApiError::not_found(format!("message '{}' not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replay_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = MessageId::parse(&id)?;
    if !state.broker.replay(&id).await? {
        return Err(ApiError::not_found(format!(
            "message '{}' is not on a dead-letter topic",
            id
        )));
    }
    Ok(Json(json!({ "replayed": true })))
}

// ── Topics ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTopicBody {
    pub name: String,
    #[serde(rename = "type")]
    pub topic_type: TopicType,
    pub schema_id: Option<String>,
    #[serde(default)]
    pub delivery_guarantee: DeliveryGuarantee,
    pub retention_secs: Option<u64>,
    pub partition_count: Option<u32>,
    pub replication_factor: Option<u32>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

pub async fn create_topic(
    State(state): State<AppState>,
    Json(body): Json<CreateTopicBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut topic = Topic::new(TopicName::new(body.name)?, body.topic_type);
    topic.delivery_guarantee = body.delivery_guarantee;
    topic.config = body.config;
    if let Some(schema_id) = body.schema_id {
        topic.schema_id = Some(SchemaId::new(schema_id)?);
    }
    if let Some(retention) = body.retention_secs {
        topic.retention_secs = retention;
    }
    if let Some(partitions) = body.partition_count {
        topic.partition_count = partitions;
    }
    if let Some(replication) = body.replication_factor {
        topic.replication_factor = replication;
    }

    let created = state.broker.create_topic(topic).await?;
    Ok((StatusCode::CREATED, Json(json!(created))))
}

pub async fn list_topics(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.broker.list_topics().await))
}

pub async fn get_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = TopicName::new(name)?;
    let topic = state
        .broker
        .get_topic(&name)
        .await
        .ok_or_else(|| ApiError::not_found(format!("topic '{}' not found", name)))?;
    Ok(Json(json!(topic)))
}

pub async fn update_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<TopicUpdate>,
) -> Result<Json<Value>, ApiError> {
    let name = TopicName::new(name)?;
    let topic = state.broker.update_topic(&name, update).await?;
    Ok(Json(json!(topic)))
}

pub async fn delete_topic(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let name = TopicName::new(name)?;
    if !state.broker.delete_topic(&name).await {
        return Err(ApiError::not_found(format!("topic '{}' not found", name)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Subscriptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionBody {
    pub topic: String,
    pub consumer_group: String,
    pub consumer_endpoint: String,
    #[serde(default)]
    pub subscription_type: SubscriptionType,
    pub max_retries: Option<u32>,
    pub ack_timeout_secs: Option<u64>,
    pub filter: Option<HashMap<String, String>>,
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Json(body): Json<CreateSubscriptionBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let topic = TopicName::new(body.topic)?;
    let mut subscription =
        Subscription::new(topic, body.consumer_group, body.consumer_endpoint);
    subscription.subscription_type = body.subscription_type;
    if let Some(max_retries) = body.max_retries {
        subscription.max_retries = max_retries;
    }
    if let Some(ack_timeout) = body.ack_timeout_secs {
        subscription.ack_timeout_secs = ack_timeout;
    }
    if let Some(header_matches) = body.filter {
        subscription.filter = Some(SubscriptionFilter { header_matches });
    }

    let created = state.broker.subscribe(subscription).await?;
    Ok((StatusCode::CREATED, Json(json!(created))))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub topic: Option<String>,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let subscriptions = match query.topic {
        Some(topic) => {
            let topic = TopicName::new(topic)?;
            state.broker.subscriptions().for_topic(&topic).await
        }
        None => state.broker.subscriptions().list().await,
    };
    Ok(Json(json!(subscriptions)))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SubscriptionId::parse(&id)?;
    if !state.broker.subscriptions().delete(&id).await {
        return Err(ApiError::not_found(format!("subscription '{}' not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    set_subscription_active(state, id, true).await
}

pub async fn deactivate_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    set_subscription_active(state, id, false).await
}

async fn set_subscription_active(
    state: AppState,
    id: String,
    active: bool,
) -> Result<Json<Value>, ApiError> {
    let id = SubscriptionId::parse(&id)?;
    let subscription = state.broker.subscriptions().set_active(&id, active).await?;
    Ok(Json(json!(subscription)))
}

// ── Schemas ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterSchemaBody {
    pub schema_id: String,
    pub definition: String,
    #[serde(default)]
    pub compatibility: CompatibilityMode,
}

pub async fn register_schema(
    State(state): State<AppState>,
    Json(body): Json<RegisterSchemaBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let schema = MessageSchema::new(
        SchemaId::new(body.schema_id)?,
        body.definition,
        body.compatibility,
    );
    let stored = state.schemas.register(schema).await?;
    Ok((StatusCode::CREATED, Json(json!(stored))))
}

pub async fn list_schemas(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.schemas.list().await))
}

pub async fn get_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = SchemaId::new(id)?;
    let schema = state
        .schemas
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("schema '{}' not found", id)))?;
    Ok(Json(json!(schema)))
}

pub async fn delete_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SchemaId::new(id)?;
    state.schemas.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RequestApprovalBody {
    pub definition: String,
    #[serde(default)]
    pub compatibility: CompatibilityMode,
    pub requested_by: String,
    #[serde(default)]
    pub approvers: Vec<String>,
}

pub async fn request_schema_approval(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RequestApprovalBody>,
) -> Result<Json<Value>, ApiError> {
    let id = SchemaId::new(id)?;
    let request = state
        .approvals
        .request_approval(
            &id,
            &body.definition,
            body.compatibility,
            &body.requested_by,
            &body.approvers,
        )
        .await?;
    Ok(Json(json!(request)))
}

#[derive(Debug, Deserialize)]
pub struct SchemaDecisionBody {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn approve_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SchemaDecisionBody>,
) -> Result<Json<Value>, ApiError> {
    let id = SchemaId::new(id)?;
    if !state.approvals.approve_schema(&id, &body.actor).await? {
        return Err(ApiError::not_found(format!("schema '{}' not found", id)));
    }
    Ok(Json(json!({ "approved": true })))
}

pub async fn reject_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SchemaDecisionBody>,
) -> Result<Json<Value>, ApiError> {
    let id = SchemaId::new(id)?;
    if !state.approvals.reject_schema(&id, &body.actor).await? {
        return Err(ApiError::not_found(format!("schema '{}' not found", id)));
    }
    Ok(Json(json!({ "rejected": true })))
}

pub async fn deprecate_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = SchemaId::new(id)?;
    if !state.approvals.deprecate_schema(&id).await? {
        return Err(ApiError::not_found(format!("schema '{}' not found", id)));
    }
    Ok(Json(json!({ "deprecated": true })))
}

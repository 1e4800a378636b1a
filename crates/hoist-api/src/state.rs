use std::sync::Arc;

use hoist_broker::{BrokerHealthMonitor, MessageBroker};
use hoist_deploy::ClusterSet;
use hoist_pipeline::{DeploymentPipeline, DeploymentTracker};
use hoist_schema::{SchemaApprovalService, SchemaRegistry};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<MessageBroker>,
    pub pipeline: Arc<DeploymentPipeline>,
    pub tracker: Arc<DeploymentTracker>,
    pub schemas: Arc<SchemaRegistry>,
    pub approvals: Arc<SchemaApprovalService>,
    pub clusters: Arc<ClusterSet>,
    pub broker_health: Arc<BrokerHealthMonitor>,
    pub auth_token: Arc<String>,
}

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/status", get(handlers::status))
        .route("/broker/health", get(handlers::broker_health))
        // Deployments
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route("/deployments/:id", get(handlers::get_deployment))
        .route("/deployments/:id/approve", post(handlers::approve_deployment))
        .route("/deployments/:id/cancel", post(handlers::cancel_deployment))
        .route("/deployments/:id/rollback", post(handlers::rollback_deployment))
        // Messages
        .route("/messages", post(handlers::publish_message))
        .route(
            "/messages/:id",
            get(handlers::get_message).delete(handlers::delete_message),
        )
        .route("/messages/:id/ack", post(handlers::acknowledge_message))
        .route("/messages/:id/replay", post(handlers::replay_message))
        // Topics
        .route("/topics", get(handlers::list_topics).post(handlers::create_topic))
        .route(
            "/topics/:name",
            get(handlers::get_topic)
                .patch(handlers::update_topic)
                .delete(handlers::delete_topic),
        )
        .route("/topics/:name/messages", get(handlers::get_topic_messages))
        // Subscriptions
        .route(
            "/subscriptions",
            get(handlers::list_subscriptions).post(handlers::create_subscription),
        )
        .route("/subscriptions/:id", delete(handlers::delete_subscription))
        .route("/subscriptions/:id/activate", post(handlers::activate_subscription))
        .route("/subscriptions/:id/deactivate", post(handlers::deactivate_subscription))
        // Schemas
        .route("/schemas", get(handlers::list_schemas).post(handlers::register_schema))
        .route(
            "/schemas/:id",
            get(handlers::get_schema).delete(handlers::delete_schema),
        )
        .route(
            "/schemas/:id/request-approval",
            post(handlers::request_schema_approval),
        )
        .route("/schemas/:id/approve", post(handlers::approve_schema))
        .route("/schemas/:id/reject", post(handlers::reject_schema))
        .route("/schemas/:id/deprecate", post(handlers::deprecate_schema))
        // Auth middleware applies to all routes above
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use hoist_broker::{
        BrokerHealthMonitor, DeadLetterService, HealthThresholds, MessageBroker,
        SubscriptionRegistry, TopicRegistry,
    };
    use hoist_deploy::{
        BlueGreenStrategy, CanaryStrategy, ClusterSet, DirectStrategy, EnvironmentCluster,
        KernelNode, NodeMetrics, ResourceStabilizationService, RollingStrategy,
        StaticMetricsProvider, StrategyRegistry,
    };
    use hoist_domain::Environment;
    use hoist_pipeline::{DeploymentPipeline, DeploymentTracker, PipelineConfig};
    use hoist_schema::{SchemaApprovalService, SchemaRegistry};
    use hoist_store::{InMemoryPersistence, InMemoryQueue, InMemoryTracker};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    fn test_app() -> Router {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let dlq = Arc::new(DeadLetterService::new(persistence.clone(), queue.clone()));
        let broker = Arc::new(MessageBroker::new(
            Arc::new(TopicRegistry::new()),
            Arc::new(SubscriptionRegistry::new()),
            persistence,
            queue.clone(),
            dlq,
        ));

        let tracker = Arc::new(DeploymentTracker::new(Arc::new(InMemoryTracker::new())));
        let mut strategies = StrategyRegistry::new();
        strategies.register(Arc::new(DirectStrategy));
        strategies.register(Arc::new(RollingStrategy));
        strategies.register(Arc::new(CanaryStrategy));
        strategies.register(Arc::new(BlueGreenStrategy));

        let mut cluster = EnvironmentCluster::new(Environment::Staging);
        cluster
            .add_node(KernelNode::new("node-0", 9400, Environment::Staging))
            .unwrap();
        let mut clusters = ClusterSet::new();
        clusters.insert(cluster);
        let clusters = Arc::new(clusters);

        let metrics = Arc::new(StaticMetricsProvider::new(NodeMetrics::default()));
        let stabilization = Arc::new(ResourceStabilizationService::new(metrics));
        let pipeline = Arc::new(DeploymentPipeline::new(
            tracker.clone(),
            Arc::new(strategies),
            clusters.clone(),
            stabilization,
            PipelineConfig { stabilization: None, ..PipelineConfig::default() },
        ));

        let schemas = Arc::new(SchemaRegistry::new());
        let approvals = Arc::new(SchemaApprovalService::new(schemas.clone()));
        let broker_health = Arc::new(BrokerHealthMonitor::new(
            queue,
            HealthThresholds::default(),
        ));

        build_app(AppState {
            broker,
            pipeline,
            tracker,
            schemas,
            approvals,
            clusters,
            broker_health,
            auth_token: Arc::new(TEST_TOKEN.to_string()),
        })
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        authed(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json"),
        )
        .body(Body::from(body.to_string()))
        .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_returns_401() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_and_ready_return_200() {
        for uri in ["/health", "/ready", "/status", "/broker/health"] {
            let app = test_app();
            let resp = app
                .oneshot(authed(Request::builder().uri(uri)).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn topic_create_get_conflict() {
        let app = test_app();
        let body = serde_json::json!({ "name": "orders", "type": "queue" });

        let resp = app.clone().oneshot(json_post("/topics", body.clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .clone()
            .oneshot(authed(Request::builder().uri("/topics/orders")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(json_post("/topics", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn publish_and_fetch_message() {
        let app = test_app();
        app.clone()
            .oneshot(json_post("/topics", serde_json::json!({ "name": "orders", "type": "queue" })))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(json_post(
                "/messages",
                serde_json::json!({ "topic": "orders", "payload": "{\"n\":1}", "priority": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let message = body_json(resp).await;
        let id = message["message_id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(
                authed(Request::builder().uri(format!("/messages/{id}")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                authed(Request::builder().uri("/topics/orders/messages?limit=10"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let listed = body_json(resp).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let resp = app
            .oneshot(json_post(&format!("/messages/{id}/ack"), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(json_post(
                "/messages",
                serde_json::json!({ "topic": "nope", "payload": "{}" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deployment_lifecycle_over_http() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(json_post(
                "/deployments",
                serde_json::json!({
                    "module_name": "billing",
                    "version": "1.0.0",
                    "environment": "staging",
                    "strategy": "direct",
                    "requester_email": "dev@example.com",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        let id = created["execution_id"].as_str().unwrap().to_string();

        // The pipeline runs in the background; poll until terminal
        let mut status = serde_json::Value::Null;
        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let resp = app
                .clone()
                .oneshot(
                    authed(Request::builder().uri(format!("/deployments/{id}")))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let state = body_json(resp).await;
            status = state["status"].clone();
            if status == "succeeded" {
                break;
            }
        }
        assert_eq!(status, "succeeded");
    }

    #[tokio::test]
    async fn invalid_deployment_version_is_400() {
        let app = test_app();
        let resp = app
            .oneshot(json_post(
                "/deployments",
                serde_json::json!({
                    "module_name": "billing",
                    "version": "not-a-version",
                    "environment": "staging",
                    "strategy": "direct",
                    "requester_email": "dev@example.com",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_deployment_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(
                authed(Request::builder().uri(format!(
                    "/deployments/{}",
                    uuid::Uuid::new_v4()
                )))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn schema_registration_and_approval_flow() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(json_post(
                "/schemas",
                serde_json::json!({
                    "schema_id": "orders-payload",
                    "definition": "{ \"type\": \"object\" }",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        // Duplicate registration conflicts
        let resp = app
            .clone()
            .oneshot(json_post(
                "/schemas",
                serde_json::json!({
                    "schema_id": "orders-payload",
                    "definition": "{ \"type\": \"object\" }",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .clone()
            .oneshot(
                authed(Request::builder().uri("/schemas/orders-payload"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Draft schemas can be deleted
        let resp = app
            .oneshot(
                authed(
                    Request::builder()
                        .method(Method::DELETE)
                        .uri("/schemas/orders-payload"),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn subscription_lifecycle_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(json_post("/topics", serde_json::json!({ "name": "orders", "type": "queue" })))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(json_post(
                "/subscriptions",
                serde_json::json!({
                    "topic": "orders",
                    "consumer_group": "workers",
                    "consumer_endpoint": "http://worker:8080/handle",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let sub = body_json(resp).await;
        let id = sub["subscription_id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(json_post(
                &format!("/subscriptions/{id}/deactivate"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let updated = body_json(resp).await;
        assert_eq!(updated["is_active"], serde_json::Value::Bool(false));

        let resp = app
            .oneshot(
                authed(
                    Request::builder()
                        .method(Method::DELETE)
                        .uri(format!("/subscriptions/{id}")),
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}

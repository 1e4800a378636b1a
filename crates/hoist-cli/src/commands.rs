use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use hoist_api::{build_app, AppState};
use hoist_broker::{
    AckTimeoutMonitor, BrokerHealthMonitor, DeadLetterService, DeliveryOptions, DeliveryService,
    Dispatcher, ExactlyOnceDelivery, HealthThresholds, HttpPushTransport, MessageBroker, Router,
    SubscriptionRegistry, TopicRegistry,
};
use hoist_config::{load_config, PipelineSettings, ServerConfig, StoreBackend};
use hoist_deploy::{
    BlueGreenStrategy, CanaryConfig, CanaryStrategy, ClusterSet, DirectStrategy,
    EnvironmentCluster, KernelNode, NodeMetrics, ResourceStabilizationService, RollingConfig,
    RollingStrategy, StabilizationConfig, StaticMetricsProvider, StrategyRegistry,
};
use hoist_pipeline::{DeploymentPipeline, DeploymentTracker, PipelineConfig};
use hoist_schema::{SchemaApprovalService, SchemaRegistry};
use hoist_store::{
    InMemoryIdempotencyStore, InMemoryLockService, InMemoryPersistence, InMemoryQueue,
    InMemoryTracker, MessageQueue, PersistenceStore, PostgresStore, RedbStore, TrackerStore,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::output;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(
    config_path: Option<PathBuf>,
    ephemeral: bool,
    rotate_token: bool,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => default_config(),
    };

    let token = load_or_create_token(rotate_token)?;

    // Stores
    let (persistence, tracker_store): (Arc<dyn PersistenceStore>, Arc<dyn TrackerStore>) =
        if ephemeral {
            println!("Using in-memory (ephemeral) store; state will be lost on server stop");
            (Arc::new(InMemoryPersistence::new()), Arc::new(InMemoryTracker::new()))
        } else {
            match &config.store {
                StoreBackend::Memory => {
                    println!("Using in-memory store; state will be lost on server stop");
                    (Arc::new(InMemoryPersistence::new()), Arc::new(InMemoryTracker::new()))
                }
                StoreBackend::Redb { path } => {
                    println!("Using persistent store at {}", path);
                    let store = Arc::new(
                        RedbStore::open(std::path::Path::new(path))
                            .with_context(|| format!("failed to open store at {path}"))?,
                    );
                    (store.clone(), store)
                }
                StoreBackend::Postgres { url } => {
                    println!("Using PostgreSQL store");
                    let store = Arc::new(
                        PostgresStore::connect(url)
                            .await
                            .context("failed to connect to PostgreSQL")?,
                    );
                    (store.clone(), store)
                }
            }
        };

    let queue: Arc<dyn MessageQueue> = if config.broker.queue_capacity > 0 {
        Arc::new(InMemoryQueue::bounded(config.broker.queue_capacity))
    } else {
        Arc::new(InMemoryQueue::new())
    };

    // Broker core
    let topics = Arc::new(TopicRegistry::new());
    let subscriptions = Arc::new(SubscriptionRegistry::new());
    let dlq = Arc::new(DeadLetterService::new(persistence.clone(), queue.clone()));
    let delivery = Arc::new(DeliveryService::new(dlq.clone()));
    let exactly_once = Arc::new(ExactlyOnceDelivery::new(
        delivery.clone(),
        Arc::new(InMemoryLockService::new()),
        Arc::new(InMemoryIdempotencyStore::new()),
    ));
    let broker = Arc::new(MessageBroker::new(
        topics.clone(),
        subscriptions.clone(),
        persistence.clone(),
        queue.clone(),
        dlq,
    ));
    let delivery_defaults = DeliveryOptions {
        max_retries: config.broker.delivery.max_retries,
        initial_backoff: config.broker.delivery.initial_backoff,
        max_backoff: config.broker.delivery.max_backoff,
        multiplier: config.broker.delivery.multiplier,
    };
    let dispatcher = Dispatcher::new(
        queue.clone(),
        persistence.clone(),
        topics,
        subscriptions,
        Arc::new(Router::new()),
        delivery,
        exactly_once,
        Arc::new(HttpPushTransport::default()),
        delivery_defaults,
    );
    let ack_monitor = AckTimeoutMonitor::new(
        queue.clone(),
        persistence.clone(),
        config.broker.ack_timeout,
        config.broker.ack_scan_interval,
    );
    let broker_health = Arc::new(
        BrokerHealthMonitor::new(
            queue.clone(),
            HealthThresholds {
                degraded_depth: config.broker.degraded_depth,
                unhealthy_depth: config.broker.unhealthy_depth,
            },
        )
        .with_interval(config.broker.health_interval),
    );

    // Deployment side
    let clusters = Arc::new(build_clusters(&config));
    for env in clusters.environments() {
        if let Some(cluster) = clusters.get(env) {
            println!("Cluster {}: {} node(s)", env, cluster.len());
        }
    }
    let metrics = Arc::new(StaticMetricsProvider::new(NodeMetrics::default()));
    let stabilization = Arc::new(ResourceStabilizationService::new(metrics));

    let mut strategies = StrategyRegistry::new();
    strategies.register(Arc::new(DirectStrategy));
    strategies.register(Arc::new(RollingStrategy));
    strategies.register(Arc::new(CanaryStrategy));
    strategies.register(Arc::new(BlueGreenStrategy));

    let tracker = Arc::new(DeploymentTracker::new(tracker_store));
    let pipeline = Arc::new(DeploymentPipeline::new(
        tracker.clone(),
        Arc::new(strategies),
        clusters.clone(),
        stabilization,
        pipeline_config(&config.pipeline),
    ));

    let schemas = Arc::new(SchemaRegistry::new());
    let approvals = Arc::new(SchemaApprovalService::new(schemas.clone()));

    // Background services
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        let monitor = broker_health.clone();
        tokio::spawn(async move { monitor.run(token).await });
    }
    {
        let token = shutdown.clone();
        tokio::spawn(async move { ack_monitor.run(token).await });
    }
    {
        let token = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(token).await });
    }

    let app = build_app(AppState {
        broker,
        pipeline,
        tracker,
        schemas,
        approvals,
        clusters,
        broker_health,
        auth_token: Arc::new(token),
    });

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("hoist server listening on http://{addr}");

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_signal.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Config used when no hoist.yml is given: memory store, default tuning, and
/// a single development cluster with three local nodes so deploys work out of
/// the box.
fn default_config() -> ServerConfig {
    use std::time::Duration;
    ServerConfig {
        bind: "127.0.0.1".to_string(),
        port: 7400,
        store: StoreBackend::Memory,
        broker: hoist_config::BrokerSettings {
            queue_capacity: 0,
            health_interval: Duration::from_secs(5),
            degraded_depth: 500,
            unhealthy_depth: 1000,
            ack_timeout: Duration::from_secs(30),
            ack_scan_interval: Duration::from_secs(5),
            delivery: hoist_config::DeliverySettings {
                max_retries: 5,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(5),
                multiplier: 2.0,
            },
        },
        pipeline: PipelineSettings {
            approval_timeout: Duration::from_secs(15 * 60),
            min_healthy_fraction: 0.5,
            smoke_test_timeout: Duration::from_secs(5 * 60),
            stabilization: None,
            rolling_batch_size: None,
            rolling_failure_threshold: 0,
            canary_soak: Duration::from_secs(30),
        },
        clusters: vec![hoist_config::ClusterTopology {
            environment: hoist_domain::Environment::Development,
            nodes: (0..3u16)
                .map(|i| hoist_config::NodeSpec {
                    hostname: format!("local-{i}"),
                    port: 9400 + i,
                })
                .collect(),
        }],
    }
}

fn build_clusters(config: &ServerConfig) -> ClusterSet {
    let mut set = ClusterSet::new();
    for topology in &config.clusters {
        let mut cluster = EnvironmentCluster::new(topology.environment);
        for node in &topology.nodes {
            let kernel_node =
                KernelNode::new(node.hostname.clone(), node.port, topology.environment);
            // Same-environment nodes always fit their own cluster
            let _ = cluster.add_node(kernel_node);
        }
        set.insert(cluster);
    }
    set
}

fn pipeline_config(settings: &PipelineSettings) -> PipelineConfig {
    PipelineConfig {
        approval_timeout: settings.approval_timeout,
        min_healthy_fraction: settings.min_healthy_fraction,
        smoke_test_timeout: settings.smoke_test_timeout,
        stabilization: settings.stabilization.as_ref().map(|s| StabilizationConfig {
            cpu_delta_percent: s.cpu_delta_percent,
            memory_delta_percent: s.memory_delta_percent,
            latency_delta_percent: s.latency_delta_percent,
            polling_interval: s.polling_interval,
            consecutive_stable_checks: s.consecutive_stable_checks,
            minimum_wait: s.minimum_wait,
            maximum_wait: s.maximum_wait,
        }),
        rolling: RollingConfig {
            batch_size: settings.rolling_batch_size,
            failure_threshold: settings.rolling_failure_threshold,
        },
        canary: CanaryConfig { soak_time: settings.canary_soak },
    }
}

// ── Token handling ────────────────────────────────────────────────────────────

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".hoist").join("token")
}

fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn write_token(path: &PathBuf, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, token)?;
    Ok(())
}

/// Reuse the saved token unless rotation is requested, so server restarts
/// don't invalidate client configurations.
fn load_or_create_token(rotate: bool) -> Result<String> {
    let path = default_token_path();
    if !rotate {
        if let Ok(existing) = std::fs::read_to_string(&path).map(|s| s.trim().to_string()) {
            if !existing.is_empty() {
                println!("Reusing existing token from {}", path.display());
                return Ok(existing);
            }
        }
    }
    let token = generate_token();
    write_token(&path, &token)?;
    if rotate {
        println!("Rotated token (written to {})", path.display());
        println!("New token: {}", token);
    } else {
        println!("Generated new token (written to {})", path.display());
    }
    Ok(token)
}

fn resolve_token(token: Option<String>) -> Result<String> {
    if let Some(token) = token {
        return Ok(token);
    }
    let path = default_token_path();
    let saved = std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if saved.is_empty() {
        bail!(
            "no auth token; pass --token, set HOIST_URL/HOIST_TOKEN, or run `hoist serve` first"
        );
    }
    Ok(saved)
}

// ── Remote commands ───────────────────────────────────────────────────────────

async fn api_get(api: &str, token: Option<String>, path: &str) -> Result<serde_json::Value> {
    let token = resolve_token(token)?;
    let response = reqwest::Client::new()
        .get(format!("{api}{path}"))
        .bearer_auth(token)
        .send()
        .await
        .with_context(|| format!("request to {api}{path} failed"))?;
    parse_response(response).await
}

async fn api_post(
    api: &str,
    token: Option<String>,
    path: &str,
    body: serde_json::Value,
) -> Result<serde_json::Value> {
    let token = resolve_token(token)?;
    let response = reqwest::Client::new()
        .post(format!("{api}{path}"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("request to {api}{path} failed"))?;
    parse_response(response).await
}

async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    if !status.is_success() {
        let detail = body["error"].as_str().unwrap_or("unknown error");
        bail!("server returned {status}: {detail}");
    }
    Ok(body)
}

#[allow(clippy::too_many_arguments)]
pub async fn deploy(
    api: &str,
    token: Option<String>,
    module: String,
    version: String,
    environment: String,
    strategy: String,
    requester: String,
    require_approval: bool,
) -> Result<()> {
    let body = serde_json::json!({
        "module_name": module,
        "version": version,
        "environment": environment,
        "strategy": strategy,
        "requester_email": requester,
        "require_approval": require_approval,
    });
    let created = api_post(api, token, "/deployments", body).await?;
    println!("Execution: {}", created["execution_id"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn deployments(api: &str, token: Option<String>) -> Result<()> {
    let listed = api_get(api, token, "/deployments").await?;
    print!("{}", output::render_executions(&listed));
    Ok(())
}

pub async fn deployment(api: &str, token: Option<String>, execution_id: &str) -> Result<()> {
    let execution = api_get(api, token, &format!("/deployments/{execution_id}")).await?;
    print!("{}", output::render_execution(&execution));
    Ok(())
}

pub async fn approve(
    api: &str,
    token: Option<String>,
    execution_id: &str,
    approved: bool,
) -> Result<()> {
    let body = serde_json::json!({ "approved": approved });
    api_post(api, token, &format!("/deployments/{execution_id}/approve"), body).await?;
    println!("{}", if approved { "Approved." } else { "Rejected." });
    Ok(())
}

pub async fn cancel(api: &str, token: Option<String>, execution_id: &str) -> Result<()> {
    api_post(api, token, &format!("/deployments/{execution_id}/cancel"), serde_json::json!({}))
        .await?;
    println!("Cancellation requested.");
    Ok(())
}

pub async fn rollback(api: &str, token: Option<String>, execution_id: &str) -> Result<()> {
    let execution = api_post(
        api,
        token,
        &format!("/deployments/{execution_id}/rollback"),
        serde_json::json!({}),
    )
    .await?;
    print!("{}", output::render_execution(&execution));
    Ok(())
}

pub async fn publish(
    api: &str,
    token: Option<String>,
    topic: String,
    payload: String,
    priority: u8,
    headers: Vec<String>,
) -> Result<()> {
    let mut header_map = HashMap::new();
    for header in headers {
        let Some((key, value)) = header.split_once('=') else {
            bail!("header '{header}' is not key=value");
        };
        header_map.insert(key.to_string(), value.to_string());
    }
    let body = serde_json::json!({
        "topic": topic,
        "payload": payload,
        "priority": priority,
        "headers": header_map,
    });
    let message = api_post(api, token, "/messages", body).await?;
    println!("Message: {}", message["message_id"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn list_topics(api: &str, token: Option<String>) -> Result<()> {
    let topics = api_get(api, token, "/topics").await?;
    print!("{}", output::render_topics(&topics));
    Ok(())
}

pub async fn create_topic(
    api: &str,
    token: Option<String>,
    name: String,
    topic_type: String,
    partitions: Option<u32>,
    guarantee: Option<String>,
) -> Result<()> {
    let mut body = serde_json::json!({ "name": name, "type": topic_type });
    if let Some(partitions) = partitions {
        body["partition_count"] = serde_json::json!(partitions);
    }
    if let Some(guarantee) = guarantee {
        body["delivery_guarantee"] = serde_json::json!(guarantee);
    }
    let topic = api_post(api, token, "/topics", body).await?;
    println!("Created topic {}", topic["name"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn list_schemas(api: &str, token: Option<String>) -> Result<()> {
    let schemas = api_get(api, token, "/schemas").await?;
    print!("{}", output::render_schemas(&schemas));
    Ok(())
}

pub async fn register_schema(
    api: &str,
    token: Option<String>,
    schema_id: String,
    definition_file: PathBuf,
    compatibility: String,
) -> Result<()> {
    let definition = std::fs::read_to_string(&definition_file)
        .with_context(|| format!("failed to read {}", definition_file.display()))?;
    let body = serde_json::json!({
        "schema_id": schema_id,
        "definition": definition,
        "compatibility": compatibility,
    });
    let schema = api_post(api, token, "/schemas", body).await?;
    println!(
        "Registered schema {} v{}",
        schema["schema_id"].as_str().unwrap_or("?"),
        schema["version"]
    );
    Ok(())
}

pub async fn decide_schema(
    api: &str,
    token: Option<String>,
    schema_id: String,
    actor: String,
    approve: bool,
) -> Result<()> {
    let action = if approve { "approve" } else { "reject" };
    let body = serde_json::json!({ "actor": actor });
    api_post(api, token, &format!("/schemas/{schema_id}/{action}"), body).await?;
    println!("Schema {schema_id} {action}d.");
    Ok(())
}

pub async fn status(api: &str, token: Option<String>) -> Result<()> {
    let status = api_get(api, token, "/status").await?;
    print!("{}", output::render_status(&status));
    Ok(())
}

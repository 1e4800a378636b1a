use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use hoist_domain::{Message, Subscription, SubscriptionId, Topic, TopicType};
use tracing::debug;

/// Topic config key selecting the routing strategy by name.
pub const ROUTING_STRATEGY_CONFIG_KEY: &str = "routingStrategy";

/// How a topic's messages are spread over its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategyKind {
    Direct,
    FanOut,
    LoadBalanced,
    Priority,
    ContentBased,
}

impl RoutingStrategyKind {
    /// Stable name exposed in route results and telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            RoutingStrategyKind::Direct => "direct",
            RoutingStrategyKind::FanOut => "fanout",
            RoutingStrategyKind::LoadBalanced => "load-balanced",
            RoutingStrategyKind::Priority => "priority",
            RoutingStrategyKind::ContentBased => "content-based",
        }
    }

    /// `None` for unrecognised names; the caller falls back to the topic
    /// default, so routing never fails on a bad config value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(RoutingStrategyKind::Direct),
            "fanout" => Some(RoutingStrategyKind::FanOut),
            "load-balanced" => Some(RoutingStrategyKind::LoadBalanced),
            "priority" => Some(RoutingStrategyKind::Priority),
            "content-based" => Some(RoutingStrategyKind::ContentBased),
            _ => None,
        }
    }

    /// Queue topics load-balance; pub/sub topics broadcast.
    pub fn default_for(topic_type: TopicType) -> Self {
        match topic_type {
            TopicType::Queue => RoutingStrategyKind::LoadBalanced,
            TopicType::PubSub => RoutingStrategyKind::FanOut,
        }
    }
}

/// Outcome of routing one message.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub success: bool,
    pub consumer_ids: Vec<SubscriptionId>,
    pub reason: String,
    pub strategy_name: &'static str,
    pub metadata: HashMap<String, String>,
    pub error_message: Option<String>,
}

impl RouteResult {
    fn success(
        consumer_ids: Vec<SubscriptionId>,
        reason: impl Into<String>,
        strategy: RoutingStrategyKind,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            success: true,
            consumer_ids,
            reason: reason.into(),
            strategy_name: strategy.name(),
            metadata,
            error_message: None,
        }
    }

    fn failure(
        reason: impl Into<String>,
        error: impl Into<String>,
        strategy: RoutingStrategyKind,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            success: false,
            consumer_ids: Vec::new(),
            reason: reason.into(),
            strategy_name: strategy.name(),
            metadata,
            error_message: Some(error.into()),
        }
    }
}

/// Selects the consumer subset for a message.
///
/// The round-robin cursor is per-router-instance state; concurrent callers
/// advance it atomically by exactly one per call.
#[derive(Debug, Default)]
pub struct Router {
    cursor: AtomicUsize,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &self,
        message: &Message,
        topic: &Topic,
        subscriptions: &[Subscription],
    ) -> RouteResult {
        let strategy = topic
            .config
            .get(ROUTING_STRATEGY_CONFIG_KEY)
            .and_then(|name| RoutingStrategyKind::parse(name))
            .unwrap_or_else(|| RoutingStrategyKind::default_for(topic.topic_type));

        let active: Vec<&Subscription> =
            subscriptions.iter().filter(|s| s.is_active).collect();
        let mut metadata = HashMap::new();
        metadata.insert("totalActive".to_string(), active.len().to_string());

        if active.is_empty() {
            return RouteResult::failure(
                "no active subscriptions on topic",
                "No active consumers",
                strategy,
                metadata,
            );
        }

        debug!(
            topic = %topic.name,
            strategy = strategy.name(),
            active = active.len(),
            "routing message"
        );

        match strategy {
            RoutingStrategyKind::Direct => {
                metadata.insert("selectedIndex".to_string(), "0".to_string());
                RouteResult::success(
                    vec![active[0].subscription_id],
                    "routed to first active consumer",
                    strategy,
                    metadata,
                )
            }
            RoutingStrategyKind::FanOut => {
                metadata.insert("broadcastCount".to_string(), active.len().to_string());
                RouteResult::success(
                    active.iter().map(|s| s.subscription_id).collect(),
                    "broadcast to all active consumers",
                    strategy,
                    metadata,
                )
            }
            RoutingStrategyKind::LoadBalanced => {
                let index = self.next_index(active.len());
                metadata.insert("selectedIndex".to_string(), index.to_string());
                RouteResult::success(
                    vec![active[index].subscription_id],
                    "round-robin selection",
                    strategy,
                    metadata,
                )
            }
            RoutingStrategyKind::Priority => {
                metadata.insert("messagePriority".to_string(), message.priority.to_string());
                let index = if message.is_high_priority() {
                    0
                } else if message.is_low_priority() {
                    active.len() - 1
                } else {
                    self.next_index(active.len())
                };
                metadata.insert("selectedIndex".to_string(), index.to_string());
                RouteResult::success(
                    vec![active[index].subscription_id],
                    "priority tier selection",
                    strategy,
                    metadata,
                )
            }
            RoutingStrategyKind::ContentBased => {
                let matched: Vec<SubscriptionId> = active
                    .iter()
                    .filter(|s| s.accepts(&message.headers))
                    .map(|s| s.subscription_id)
                    .collect();
                metadata.insert("matchedCount".to_string(), matched.len().to_string());
                if matched.is_empty() {
                    return RouteResult::failure(
                        "no subscription filter matched the message headers",
                        "No matching consumers",
                        strategy,
                        metadata,
                    );
                }
                RouteResult::success(matched, "header filter match", strategy, metadata)
            }
        }
    }

    fn next_index(&self, len: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }
}

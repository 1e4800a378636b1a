use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{MessageId, SchemaId, SubscriptionId, TopicName};

/// Header consulted by exactly-once delivery before falling back to the
/// message id.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Priority at or above this routes to the high tier.
pub const HIGH_PRIORITY_THRESHOLD: u8 = 7;
/// Priority at or below this routes to the low tier.
pub const LOW_PRIORITY_THRESHOLD: u8 = 3;
pub const MAX_PRIORITY: u8 = 9;

pub const MAX_PARTITIONS: u32 = 16;

// ── Topic ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    Queue,
    PubSub,
}

impl std::fmt::Display for TopicType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicType::Queue => write!(f, "queue"),
            TopicType::PubSub => write!(f, "pubsub"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryGuarantee {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl std::fmt::Display for DeliveryGuarantee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryGuarantee::AtMostOnce => write!(f, "at-most-once"),
            DeliveryGuarantee::AtLeastOnce => write!(f, "at-least-once"),
            DeliveryGuarantee::ExactlyOnce => write!(f, "exactly-once"),
        }
    }
}

/// A named message stream.
///
/// `topic_type` is immutable after creation and `partition_count` may only
/// grow (both enforced by the topic registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: TopicName,
    pub topic_type: TopicType,
    pub schema_id: Option<SchemaId>,
    pub delivery_guarantee: DeliveryGuarantee,
    pub retention_secs: u64,
    pub partition_count: u32,
    pub replication_factor: u32,
    pub config: HashMap<String, String>,
}

impl Topic {
    pub fn new(name: TopicName, topic_type: TopicType) -> Self {
        Self {
            name,
            topic_type,
            schema_id: None,
            delivery_guarantee: DeliveryGuarantee::default(),
            retention_secs: 7 * 24 * 3600,
            partition_count: 1,
            replication_factor: 1,
            config: HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.partition_count < 1 || self.partition_count > MAX_PARTITIONS {
            return Err(DomainError::InvalidPartitionCount(self.partition_count));
        }
        Ok(())
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Pending,
    Delivered,
    Acknowledged,
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Acknowledged => write!(f, "acknowledged"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One message on a topic. The payload is opaque to the broker (typically a
/// JSON document validated against the topic's schema upstream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub topic: TopicName,
    pub payload: String,
    pub schema_version: Option<u32>,
    pub priority: u8,
    /// Monotonically nondecreasing across the message's lifetime.
    pub delivery_attempts: u32,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub ack_deadline: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(
        topic: TopicName,
        payload: impl Into<String>,
        priority: u8,
    ) -> Result<Self, DomainError> {
        if priority > MAX_PRIORITY {
            return Err(DomainError::InvalidPriority(priority));
        }
        Ok(Self {
            message_id: MessageId::new(),
            topic,
            payload: payload.into(),
            schema_version: None,
            priority,
            delivery_attempts: 0,
            timestamp: Utc::now(),
            status: MessageStatus::Pending,
            ack_deadline: None,
            acknowledged_at: None,
            headers: HashMap::new(),
        })
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority >= HIGH_PRIORITY_THRESHOLD
    }

    pub fn is_low_priority(&self) -> bool {
        self.priority <= LOW_PRIORITY_THRESHOLD
    }

    /// The key exactly-once delivery deduplicates on: the `Idempotency-Key`
    /// header when non-empty, otherwise the message id.
    pub fn idempotency_key(&self) -> String {
        match self.headers.get(IDEMPOTENCY_KEY_HEADER) {
            Some(k) if !k.trim().is_empty() => k.clone(),
            _ => self.message_id.to_string(),
        }
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    #[default]
    Push,
    Pull,
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionType::Push => write!(f, "push"),
            SubscriptionType::Pull => write!(f, "pull"),
        }
    }
}

/// Header-equality filter for content-based routing. An empty match set
/// matches every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubscriptionFilter {
    pub header_matches: HashMap<String, String>,
}

impl SubscriptionFilter {
    /// True when every configured key is present with the exact value.
    pub fn matches(&self, headers: &HashMap<String, String>) -> bool {
        self.header_matches
            .iter()
            .all(|(k, v)| headers.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub topic: TopicName,
    pub consumer_group: String,
    pub consumer_endpoint: String,
    pub subscription_type: SubscriptionType,
    pub is_active: bool,
    pub filter: Option<SubscriptionFilter>,
    pub max_retries: u32,
    pub ack_timeout_secs: u64,
}

impl Subscription {
    pub fn new(
        topic: TopicName,
        consumer_group: impl Into<String>,
        consumer_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: SubscriptionId::new(),
            topic,
            consumer_group: consumer_group.into(),
            consumer_endpoint: consumer_endpoint.into(),
            subscription_type: SubscriptionType::default(),
            is_active: true,
            filter: None,
            max_retries: 5,
            ack_timeout_secs: 30,
        }
    }

    /// A subscription with no filter, or an empty one, accepts every message.
    pub fn accepts(&self, headers: &HashMap<String, String>) -> bool {
        match &self.filter {
            None => true,
            Some(f) => f.header_matches.is_empty() || f.matches(headers),
        }
    }
}

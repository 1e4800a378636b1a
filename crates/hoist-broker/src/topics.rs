use std::collections::HashMap;
use std::sync::Arc;

use hoist_domain::{SchemaId, Subscription, SubscriptionId, Topic, TopicName};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::BrokerError;

/// Mutable subset of a topic. `topic_type` is deliberately absent: the type
/// is immutable for the life of the topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicUpdate {
    pub schema_id: Option<SchemaId>,
    pub delivery_guarantee: Option<hoist_domain::DeliveryGuarantee>,
    pub retention_secs: Option<u64>,
    pub partition_count: Option<u32>,
    pub replication_factor: Option<u32>,
    pub config: Option<HashMap<String, String>>,
}

/// In-memory topic catalogue enforcing the topic invariants: unique names
/// and a partition count that never decreases.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    inner: Arc<RwLock<HashMap<TopicName, Topic>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, topic: Topic) -> Result<Topic, BrokerError> {
        topic.validate()?;
        let mut guard = self.inner.write().await;
        if guard.contains_key(&topic.name) {
            return Err(BrokerError::TopicExists(topic.name));
        }
        guard.insert(topic.name.clone(), topic.clone());
        Ok(topic)
    }

    pub async fn get(&self, name: &TopicName) -> Option<Topic> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Topic> {
        let guard = self.inner.read().await;
        let mut all: Vec<Topic> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        all
    }

    pub async fn update(
        &self,
        name: &TopicName,
        update: TopicUpdate,
    ) -> Result<Topic, BrokerError> {
        let mut guard = self.inner.write().await;
        let topic = guard
            .get_mut(name)
            .ok_or_else(|| BrokerError::TopicNotFound(name.clone()))?;

        if let Some(requested) = update.partition_count {
            if requested < topic.partition_count {
                return Err(BrokerError::PartitionShrink {
                    current: topic.partition_count,
                    requested,
                });
            }
            topic.partition_count = requested;
        }
        if let Some(schema_id) = update.schema_id {
            topic.schema_id = Some(schema_id);
        }
        if let Some(guarantee) = update.delivery_guarantee {
            topic.delivery_guarantee = guarantee;
        }
        if let Some(retention) = update.retention_secs {
            topic.retention_secs = retention;
        }
        if let Some(replication) = update.replication_factor {
            topic.replication_factor = replication;
        }
        if let Some(config) = update.config {
            topic.config = config;
        }
        topic.validate()?;
        Ok(topic.clone())
    }

    pub async fn delete(&self, name: &TopicName) -> bool {
        self.inner.write().await.remove(name).is_some()
    }
}

/// In-memory subscription catalogue.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, subscription: Subscription) -> Subscription {
        let mut guard = self.inner.write().await;
        guard.insert(subscription.subscription_id, subscription.clone());
        subscription
    }

    pub async fn get(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Subscription> {
        let guard = self.inner.read().await;
        let mut all: Vec<Subscription> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.consumer_group.cmp(&b.consumer_group));
        all
    }

    /// Every subscription on `topic`, active or not (the router filters).
    pub async fn for_topic(&self, topic: &TopicName) -> Vec<Subscription> {
        let guard = self.inner.read().await;
        let mut subs: Vec<Subscription> = guard
            .values()
            .filter(|s| &s.topic == topic)
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.consumer_group.cmp(&b.consumer_group));
        subs
    }

    pub async fn set_active(
        &self,
        id: &SubscriptionId,
        active: bool,
    ) -> Result<Subscription, BrokerError> {
        let mut guard = self.inner.write().await;
        let sub = guard
            .get_mut(id)
            .ok_or(BrokerError::SubscriptionNotFound(*id))?;
        sub.is_active = active;
        Ok(sub.clone())
    }

    pub async fn delete(&self, id: &SubscriptionId) -> bool {
        self.inner.write().await.remove(id).is_some()
    }
}

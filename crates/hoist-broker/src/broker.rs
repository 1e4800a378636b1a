use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hoist_domain::{
    Message, MessageId, MessageStatus, Subscription, Topic, TopicName,
};
use hoist_store::{MessageQueue, PersistenceStore};
use tracing::info;

use crate::dlq::DeadLetterService;
use crate::error::BrokerError;
use crate::topics::{SubscriptionRegistry, TopicRegistry, TopicUpdate};

/// Hard cap on `get_by_topic` fetches; larger requests are clamped.
pub const MAX_TOPIC_FETCH: u32 = 1000;

/// The broker facade the API surface talks to: publish, fetch, acknowledge,
/// delete, replay, and topic/subscription management.
#[derive(Clone)]
pub struct MessageBroker {
    topics: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    persistence: Arc<dyn PersistenceStore>,
    queue: Arc<dyn MessageQueue>,
    dlq: Arc<DeadLetterService>,
}

impl MessageBroker {
    pub fn new(
        topics: Arc<TopicRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        persistence: Arc<dyn PersistenceStore>,
        queue: Arc<dyn MessageQueue>,
        dlq: Arc<DeadLetterService>,
    ) -> Self {
        Self { topics, subscriptions, persistence, queue, dlq }
    }

    pub fn topics(&self) -> &Arc<TopicRegistry> {
        &self.topics
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    /// Persist and enqueue a new message on an existing topic.
    pub async fn publish(
        &self,
        topic_name: &TopicName,
        payload: impl Into<String>,
        priority: u8,
        headers: HashMap<String, String>,
    ) -> Result<Message, BrokerError> {
        let Some(_topic) = self.topics.get(topic_name).await else {
            return Err(BrokerError::TopicNotFound(topic_name.clone()));
        };

        let mut message = Message::new(topic_name.clone(), payload, priority)?;
        message.headers = headers;

        self.persistence.store(&message).await?;
        self.queue.enqueue(message.clone()).await?;
        info!(
            message_id = %message.message_id,
            topic = %topic_name,
            priority,
            "message published"
        );
        Ok(message)
    }

    pub async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, BrokerError> {
        Ok(self.persistence.retrieve(id).await?)
    }

    /// Messages on `topic`, oldest first, `limit` clamped to
    /// [`MAX_TOPIC_FETCH`].
    pub async fn get_by_topic(
        &self,
        topic: &TopicName,
        limit: u32,
    ) -> Result<Vec<Message>, BrokerError> {
        let limit = limit.min(MAX_TOPIC_FETCH);
        Ok(self.persistence.get_by_topic(topic, limit).await?)
    }

    /// Mark a message acknowledged and drop it from the in-flight queue.
    /// Returns false for an unknown message id.
    pub async fn acknowledge(&self, id: &MessageId) -> Result<bool, BrokerError> {
        let Some(mut message) = self.persistence.retrieve(id).await? else {
            return Ok(false);
        };
        message.status = MessageStatus::Acknowledged;
        message.acknowledged_at = Some(Utc::now());
        message.ack_deadline = None;
        self.persistence.store(&message).await?;
        self.queue.remove(id).await?;
        Ok(true)
    }

    /// Remove a message from the queue and the store. Returns false for an
    /// unknown message id.
    pub async fn delete_message(&self, id: &MessageId) -> Result<bool, BrokerError> {
        self.queue.remove(id).await?;
        Ok(self.persistence.delete(id).await?)
    }

    /// Replay a dead-lettered message back to its original topic.
    pub async fn replay(&self, id: &MessageId) -> Result<bool, BrokerError> {
        self.dlq.replay_from_dlq(id).await
    }

    // ── Topics ────────────────────────────────────────────────────────────────

    pub async fn create_topic(&self, topic: Topic) -> Result<Topic, BrokerError> {
        self.topics.create(topic).await
    }

    pub async fn get_topic(&self, name: &TopicName) -> Option<Topic> {
        self.topics.get(name).await
    }

    pub async fn list_topics(&self) -> Vec<Topic> {
        self.topics.list().await
    }

    pub async fn update_topic(
        &self,
        name: &TopicName,
        update: TopicUpdate,
    ) -> Result<Topic, BrokerError> {
        self.topics.update(name, update).await
    }

    pub async fn delete_topic(&self, name: &TopicName) -> bool {
        self.topics.delete(name).await
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    /// Create a subscription. Its topic must exist.
    pub async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> Result<Subscription, BrokerError> {
        if self.topics.get(&subscription.topic).await.is_none() {
            return Err(BrokerError::TopicNotFound(subscription.topic.clone()));
        }
        Ok(self.subscriptions.create(subscription).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_domain::TopicType;
    use hoist_store::{InMemoryPersistence, InMemoryQueue};

    fn broker() -> (MessageBroker, Arc<InMemoryQueue>) {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let dlq = Arc::new(DeadLetterService::new(persistence.clone(), queue.clone()));
        (
            MessageBroker::new(
                Arc::new(TopicRegistry::new()),
                Arc::new(SubscriptionRegistry::new()),
                persistence,
                queue.clone(),
                dlq,
            ),
            queue,
        )
    }

    async fn with_topic(broker: &MessageBroker, name: &str) -> TopicName {
        let topic_name = TopicName::new(name).unwrap();
        broker
            .create_topic(Topic::new(topic_name.clone(), TopicType::Queue))
            .await
            .unwrap();
        topic_name
    }

    #[tokio::test]
    async fn publish_persists_and_enqueues() {
        let (broker, queue) = broker();
        let topic = with_topic(&broker, "orders").await;

        let msg = broker.publish(&topic, "{\"n\":1}", 5, HashMap::new()).await.unwrap();

        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(queue.count().await.unwrap(), 1);
        let stored = broker.get_message(&msg.message_id).await.unwrap();
        assert_eq!(stored, Some(msg));
    }

    #[tokio::test]
    async fn publish_to_missing_topic_is_rejected() {
        let (broker, _) = broker();
        let err = broker
            .publish(&TopicName::new("nope").unwrap(), "{}", 0, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn get_by_topic_clamps_the_limit() {
        let (broker, _) = broker();
        let topic = with_topic(&broker, "orders").await;
        for _ in 0..3 {
            broker.publish(&topic, "{}", 0, HashMap::new()).await.unwrap();
        }

        let got = broker.get_by_topic(&topic, 50_000).await.unwrap();
        assert_eq!(got.len(), 3);
        let got = broker.get_by_topic(&topic, 2).await.unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn acknowledge_clears_deadline_and_queue_entry() {
        let (broker, queue) = broker();
        let topic = with_topic(&broker, "orders").await;
        let msg = broker.publish(&topic, "{}", 0, HashMap::new()).await.unwrap();

        assert!(broker.acknowledge(&msg.message_id).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 0);

        let stored = broker.get_message(&msg.message_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Acknowledged);
        assert!(stored.acknowledged_at.is_some());
        assert!(stored.ack_deadline.is_none());

        assert!(!broker.acknowledge(&MessageId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_everywhere() {
        let (broker, queue) = broker();
        let topic = with_topic(&broker, "orders").await;
        let msg = broker.publish(&topic, "{}", 0, HashMap::new()).await.unwrap();

        assert!(broker.delete_message(&msg.message_id).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 0);
        assert!(broker.get_message(&msg.message_id).await.unwrap().is_none());
        assert!(!broker.delete_message(&msg.message_id).await.unwrap());
    }

    #[tokio::test]
    async fn subscribe_requires_the_topic() {
        let (broker, _) = broker();
        let err = broker
            .subscribe(Subscription::new(
                TopicName::new("nope").unwrap(),
                "group",
                "http://consumer",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TopicNotFound(_)));

        let topic = with_topic(&broker, "orders").await;
        let sub = broker
            .subscribe(Subscription::new(topic, "group", "http://consumer"))
            .await
            .unwrap();
        assert!(sub.is_active);
    }
}

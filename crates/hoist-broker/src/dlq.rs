use std::sync::Arc;

use chrono::Utc;
use hoist_domain::{Message, MessageId, MessageStatus, TopicName};
use hoist_store::{MessageQueue, PersistenceStore};
use tracing::{info, warn};

use crate::error::BrokerError;

// DLQ headers, bit-exact wire names.
pub const DLQ_ORIGINAL_TOPIC_HEADER: &str = "X-Original-Topic";
pub const DLQ_REASON_HEADER: &str = "X-DLQ-Reason";
pub const DLQ_DELIVERY_ATTEMPTS_HEADER: &str = "X-Delivery-Attempts";
pub const DLQ_TIMESTAMP_HEADER: &str = "X-DLQ-Timestamp";

const UNKNOWN_REASON: &str = "Unknown error";

/// Moves exhausted messages onto their `<topic>.dlq` twin and replays them
/// back.
#[derive(Clone)]
pub struct DeadLetterService {
    persistence: Arc<dyn PersistenceStore>,
    queue: Arc<dyn MessageQueue>,
}

impl DeadLetterService {
    pub fn new(persistence: Arc<dyn PersistenceStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { persistence, queue }
    }

    /// Move `message` onto its DLQ topic: status Failed, ack deadline
    /// cleared, provenance headers attached, all other headers preserved.
    ///
    /// Returns false when the DLQ enqueue itself failed (the updated message
    /// is still persisted for inspection).
    pub async fn move_to_dlq(
        &self,
        message: &mut Message,
        reason: &str,
    ) -> Result<bool, BrokerError> {
        let original_topic = message.topic.clone();
        let reason = if reason.trim().is_empty() { UNKNOWN_REASON } else { reason };

        message.topic = original_topic.dlq();
        message.status = MessageStatus::Failed;
        message.ack_deadline = None;
        message
            .headers
            .insert(DLQ_ORIGINAL_TOPIC_HEADER.to_string(), original_topic.0.clone());
        message
            .headers
            .insert(DLQ_REASON_HEADER.to_string(), reason.to_string());
        message.headers.insert(
            DLQ_DELIVERY_ATTEMPTS_HEADER.to_string(),
            message.delivery_attempts.to_string(),
        );
        message
            .headers
            .insert(DLQ_TIMESTAMP_HEADER.to_string(), Utc::now().to_rfc3339());

        self.persistence.store(message).await?;
        match self.queue.enqueue(message.clone()).await {
            Ok(()) => {
                info!(
                    message_id = %message.message_id,
                    original_topic = %original_topic,
                    dlq_topic = %message.topic,
                    reason,
                    "message dead-lettered"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "DLQ enqueue failed"
                );
                Ok(false)
            }
        }
    }

    /// Restore a dead-lettered message to its original topic: status back to
    /// Pending, attempts reset to zero, DLQ routing headers removed, and the
    /// message re-enqueued. Returns false when `message_id` is not a
    /// dead-lettered message.
    pub async fn replay_from_dlq(&self, message_id: &MessageId) -> Result<bool, BrokerError> {
        let Some(mut message) = self.persistence.retrieve(message_id).await? else {
            return Ok(false);
        };
        if !message.topic.is_dlq() {
            return Ok(false);
        }
        let Some(original) = message.headers.remove(DLQ_ORIGINAL_TOPIC_HEADER) else {
            return Ok(false);
        };

        message.topic = TopicName::new(original)?;
        message.status = MessageStatus::Pending;
        message.delivery_attempts = 0;
        message.ack_deadline = None;
        message.headers.remove(DLQ_REASON_HEADER);

        // Pull the DLQ copy out of the in-flight queue, if still there.
        self.queue.remove(&message.message_id).await?;
        self.persistence.store(&message).await?;
        self.queue.enqueue(message.clone()).await?;

        info!(
            message_id = %message.message_id,
            topic = %message.topic,
            "message replayed from DLQ"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_store::{InMemoryPersistence, InMemoryQueue};

    fn service() -> (DeadLetterService, Arc<InMemoryPersistence>, Arc<InMemoryQueue>) {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        (
            DeadLetterService::new(persistence.clone(), queue.clone()),
            persistence,
            queue,
        )
    }

    fn message() -> Message {
        let mut msg = Message::new(TopicName::new("orders").unwrap(), "{}", 0).unwrap();
        msg.delivery_attempts = 3;
        msg.ack_deadline = Some(Utc::now());
        msg.headers.insert("tenant".to_string(), "acme".to_string());
        msg
    }

    #[tokio::test]
    async fn move_to_dlq_rewrites_the_message() {
        let (service, persistence, queue) = service();
        let mut msg = message();

        let moved = service.move_to_dlq(&mut msg, "consumer unreachable").await.unwrap();
        assert!(moved);

        assert_eq!(msg.topic.as_str(), "orders.dlq");
        assert_eq!(msg.status, MessageStatus::Failed);
        assert!(msg.ack_deadline.is_none());
        assert_eq!(msg.headers.get(DLQ_ORIGINAL_TOPIC_HEADER).unwrap(), "orders");
        assert_eq!(msg.headers.get(DLQ_REASON_HEADER).unwrap(), "consumer unreachable");
        assert_eq!(msg.headers.get(DLQ_DELIVERY_ATTEMPTS_HEADER).unwrap(), "3");
        assert!(msg.headers.contains_key(DLQ_TIMESTAMP_HEADER));
        // Unrelated headers survive
        assert_eq!(msg.headers.get("tenant").unwrap(), "acme");

        // Persisted on the DLQ topic and enqueued
        let on_dlq = persistence
            .get_by_topic(&TopicName::new("orders.dlq").unwrap(), 10)
            .await
            .unwrap();
        assert_eq!(on_dlq.len(), 1);
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_reason_becomes_unknown_error() {
        let (service, _, _) = service();
        let mut msg = message();
        service.move_to_dlq(&mut msg, "  ").await.unwrap();
        assert_eq!(msg.headers.get(DLQ_REASON_HEADER).unwrap(), "Unknown error");
    }

    #[tokio::test]
    async fn enqueue_failure_returns_false() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::bounded(0));
        let service = DeadLetterService::new(persistence, queue);

        let mut msg = message();
        let moved = service.move_to_dlq(&mut msg, "nope").await.unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn replay_is_the_left_inverse_of_move() {
        let (service, persistence, queue) = service();
        let mut msg = message();
        let id = msg.message_id;
        service.move_to_dlq(&mut msg, "boom").await.unwrap();

        assert!(service.replay_from_dlq(&id).await.unwrap());

        let restored = persistence.retrieve(&id).await.unwrap().unwrap();
        assert_eq!(restored.topic.as_str(), "orders");
        assert_eq!(restored.status, MessageStatus::Pending);
        assert_eq!(restored.delivery_attempts, 0);
        assert!(!restored.headers.contains_key(DLQ_ORIGINAL_TOPIC_HEADER));
        assert!(!restored.headers.contains_key(DLQ_REASON_HEADER));
        assert_eq!(restored.headers.get("tenant").unwrap(), "acme");

        // Exactly one queued copy, on the original topic
        let queued = queue.peek(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].topic.as_str(), "orders");
    }

    #[tokio::test]
    async fn replay_of_unknown_or_live_message_is_false() {
        let (service, persistence, _) = service();
        assert!(!service.replay_from_dlq(&MessageId::new()).await.unwrap());

        // A message that was never dead-lettered is not replayable
        let msg = message();
        persistence.store(&msg).await.unwrap();
        assert!(!service.replay_from_dlq(&msg.message_id).await.unwrap());
    }
}

use std::sync::Arc;
use std::time::Duration;

use hoist_domain::{Message, SubscriptionId};
use hoist_store::{DistributedLock, IdempotencyStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::delivery::{DeliverFn, DeliveryOptions, DeliveryOutcome, DeliveryService};
use crate::error::BrokerError;

/// Result of one exactly-once delivery call. At most one caller per
/// idempotency key ever sees `is_success`; contemporaries see
/// `is_duplicate`.
#[derive(Debug, Clone)]
pub struct ExactlyOnceOutcome {
    pub is_success: bool,
    pub is_duplicate: bool,
    pub delivery: Option<DeliveryOutcome>,
    pub error_message: Option<String>,
}

impl ExactlyOnceOutcome {
    fn duplicate() -> Self {
        Self { is_success: false, is_duplicate: true, delivery: None, error_message: None }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            is_duplicate: false,
            delivery: None,
            error_message: Some(message.into()),
        }
    }
}

/// Wraps the retrying delivery service with a distributed lock and an
/// idempotency store so each key commits at most once.
#[derive(Clone)]
pub struct ExactlyOnceDelivery {
    delivery: Arc<DeliveryService>,
    lock: Arc<dyn DistributedLock>,
    idempotency: Arc<dyn IdempotencyStore>,
    lock_ttl: Duration,
    lock_timeout: Duration,
}

impl ExactlyOnceDelivery {
    pub fn new(
        delivery: Arc<DeliveryService>,
        lock: Arc<dyn DistributedLock>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            delivery,
            lock,
            idempotency,
            lock_ttl: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_lock_timing(mut self, ttl: Duration, timeout: Duration) -> Self {
        self.lock_ttl = ttl;
        self.lock_timeout = timeout;
        self
    }

    /// Deliver under the message's idempotency key.
    ///
    /// The lock is released exactly once on every path: success, delivery
    /// failure, duplicate, store error, and cancellation.
    pub async fn deliver(
        &self,
        message: &mut Message,
        consumer_id: SubscriptionId,
        deliver_fn: &DeliverFn,
        options: &DeliveryOptions,
        cancel: &CancellationToken,
    ) -> Result<ExactlyOnceOutcome, BrokerError> {
        let key = message.idempotency_key();

        let Some(token) = self.lock.acquire(&key, self.lock_ttl, self.lock_timeout).await?
        else {
            debug!(key, message_id = %message.message_id, "lock acquisition timed out");
            return Ok(ExactlyOnceOutcome::failure("Could not acquire lock"));
        };

        let outcome = self
            .deliver_locked(&key, message, consumer_id, deliver_fn, options, cancel)
            .await;
        if let Err(e) = self.lock.release(&token).await {
            warn!(key, error = %e, "lock release failed; TTL will reclaim it");
        }
        outcome
    }

    async fn deliver_locked(
        &self,
        key: &str,
        message: &mut Message,
        consumer_id: SubscriptionId,
        deliver_fn: &DeliverFn,
        options: &DeliveryOptions,
        cancel: &CancellationToken,
    ) -> Result<ExactlyOnceOutcome, BrokerError> {
        if self.idempotency.has_been_processed(key).await? {
            debug!(key, message_id = %message.message_id, "duplicate delivery suppressed");
            return Ok(ExactlyOnceOutcome::duplicate());
        }

        let delivery = self
            .delivery
            .deliver_with_retry(message, consumer_id, deliver_fn, options, cancel)
            .await?;

        if !delivery.is_success {
            let error_message = delivery.error_message.clone();
            return Ok(ExactlyOnceOutcome {
                is_success: false,
                is_duplicate: false,
                delivery: Some(delivery),
                error_message,
            });
        }

        // The commit point: the key must be recorded before success is
        // reported, otherwise a retry could deliver twice.
        if let Err(e) = self.idempotency.mark_processed(key, &message.message_id).await {
            warn!(key, error = %e, "idempotency mark failed after delivery");
            return Ok(ExactlyOnceOutcome {
                is_success: false,
                is_duplicate: false,
                delivery: Some(delivery),
                error_message: Some(format!("failed to record idempotency key: {e}")),
            });
        }

        Ok(ExactlyOnceOutcome {
            is_success: true,
            is_duplicate: false,
            delivery: Some(delivery),
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::DeadLetterService;
    use async_trait::async_trait;
    use hoist_domain::{MessageId, TopicName, IDEMPOTENCY_KEY_HEADER};
    use hoist_store::{
        InMemoryIdempotencyStore, InMemoryLockService, InMemoryPersistence, InMemoryQueue,
        StoreError,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    fn exactly_once() -> (ExactlyOnceDelivery, Arc<InMemoryIdempotencyStore>) {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let dlq = Arc::new(DeadLetterService::new(persistence, queue));
        let delivery = Arc::new(DeliveryService::new(dlq));
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        (
            ExactlyOnceDelivery::new(
                delivery,
                Arc::new(InMemoryLockService::new()),
                idempotency.clone(),
            ),
            idempotency,
        )
    }

    fn counted_success() -> (DeliverFn, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let f: DeliverFn = Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });
        (f, calls)
    }

    fn keyed_message(key: &str) -> Message {
        let mut msg = Message::new(TopicName::new("orders").unwrap(), "{}", 0).unwrap();
        msg.headers
            .insert(IDEMPOTENCY_KEY_HEADER.to_string(), key.to_string());
        msg
    }

    fn options() -> DeliveryOptions {
        DeliveryOptions {
            max_retries: 1,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn delivers_once_then_suppresses_duplicates() {
        let (service, _) = exactly_once();
        let (f, calls) = counted_success();
        let cancel = CancellationToken::new();

        let mut first = keyed_message("K");
        let outcome = service
            .deliver(&mut first, SubscriptionId::new(), &f, &options(), &cancel)
            .await
            .unwrap();
        assert!(outcome.is_success);
        assert!(!outcome.is_duplicate);

        let mut second = keyed_message("K");
        let outcome = service
            .deliver(&mut second, SubscriptionId::new(), &f, &options(), &cancel)
            .await
            .unwrap();
        assert!(outcome.is_duplicate);
        assert!(!outcome.is_success);

        assert_eq!(calls.load(Ordering::SeqCst), 1, "deliverFn runs once per key");
    }

    #[tokio::test]
    async fn concurrent_same_key_commits_exactly_once() {
        let (service, _) = exactly_once();
        let service = Arc::new(service);
        let (f, calls) = counted_success();
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = service.clone();
            let f = f.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut msg = keyed_message("K");
                service
                    .deliver(&mut msg, SubscriptionId::new(), &f, &options(), &cancel)
                    .await
                    .unwrap()
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let successes = outcomes.iter().filter(|o| o.is_success).count();
        let duplicates = outcomes.iter().filter(|o| o.is_duplicate).count();
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_deliver_independently() {
        let (service, _) = exactly_once();
        let (f, calls) = counted_success();
        let cancel = CancellationToken::new();

        for key in ["A", "B"] {
            let mut msg = keyed_message(key);
            let outcome = service
                .deliver(&mut msg, SubscriptionId::new(), &f, &options(), &cancel)
                .await
                .unwrap();
            assert!(outcome.is_success);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_header_falls_back_to_message_id() {
        let (service, idempotency) = exactly_once();
        let (f, _) = counted_success();
        let cancel = CancellationToken::new();

        let mut msg = Message::new(TopicName::new("orders").unwrap(), "{}", 0).unwrap();
        let id = msg.message_id;
        service
            .deliver(&mut msg, SubscriptionId::new(), &f, &options(), &cancel)
            .await
            .unwrap();

        assert!(idempotency.has_been_processed(&id.to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn lock_timeout_attempts_no_delivery() {
        // Build with a shared lock service so the test can hold the key
        let lock = Arc::new(InMemoryLockService::new());
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let delivery = Arc::new(DeliveryService::new(Arc::new(DeadLetterService::new(
            persistence, queue,
        ))));
        let service = ExactlyOnceDelivery::new(
            delivery,
            lock.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
        )
        .with_lock_timing(Duration::from_secs(5), Duration::from_millis(20));

        let held = lock
            .acquire("K", Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        let (f, calls) = counted_success();
        let mut msg = keyed_message("K");
        let outcome = service
            .deliver(
                &mut msg,
                SubscriptionId::new(),
                &f,
                &options(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!outcome.is_success);
        assert_eq!(outcome.error_message.as_deref(), Some("Could not acquire lock"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        lock.release(&held).await.unwrap();
    }

    /// An idempotency store whose mark always fails.
    struct FailingMark;

    #[async_trait]
    impl IdempotencyStore for FailingMark {
        async fn has_been_processed(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn mark_processed(
            &self,
            _key: &str,
            _message_id: &MessageId,
        ) -> Result<(), StoreError> {
            Err(StoreError::Internal("write quorum lost".to_string()))
        }
        async fn processed_message(&self, _key: &str) -> Result<Option<MessageId>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn mark_failure_reports_failure_not_success() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let delivery = Arc::new(DeliveryService::new(Arc::new(DeadLetterService::new(
            persistence, queue,
        ))));
        let service = ExactlyOnceDelivery::new(
            delivery,
            Arc::new(InMemoryLockService::new()),
            Arc::new(FailingMark),
        );

        let (f, calls) = counted_success();
        let mut msg = keyed_message("K");
        let outcome = service
            .deliver(
                &mut msg,
                SubscriptionId::new(),
                &f,
                &options(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!outcome.is_success);
        assert!(!outcome.is_duplicate);
        assert!(outcome
            .error_message
            .unwrap()
            .contains("failed to record idempotency key"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_releases_the_lock_and_does_not_mark() {
        let lock = Arc::new(InMemoryLockService::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue = Arc::new(InMemoryQueue::new());
        let delivery = Arc::new(DeliveryService::new(Arc::new(DeadLetterService::new(
            persistence, queue,
        ))));
        let service =
            ExactlyOnceDelivery::new(delivery, lock.clone(), idempotency.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (f, _) = counted_success();
        let mut msg = keyed_message("K");

        let err = service
            .deliver(&mut msg, SubscriptionId::new(), &f, &options(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Cancelled));

        assert!(!idempotency.has_been_processed("K").await.unwrap());
        // Lock was released: an immediate acquire succeeds
        let reacquired = lock
            .acquire("K", Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(reacquired.is_some());
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hoist_store::{MessageQueue, PersistenceStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Requeues in-flight messages whose ack deadline expired.
///
/// Runs on a fixed interval. Per-message failures are logged and skipped;
/// a queue-wide failure backs off one interval and retries.
pub struct AckTimeoutMonitor {
    queue: Arc<dyn MessageQueue>,
    persistence: Arc<dyn PersistenceStore>,
    ack_timeout: chrono::Duration,
    scan_interval: Duration,
    batch_size: u32,
}

impl AckTimeoutMonitor {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        persistence: Arc<dyn PersistenceStore>,
        ack_timeout: Duration,
        scan_interval: Duration,
    ) -> Self {
        Self {
            queue,
            persistence,
            ack_timeout: chrono::Duration::from_std(ack_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            scan_interval,
            batch_size: 100,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.scan_interval) => {}
            }
            match self.scan_once().await {
                Ok(0) => {}
                Ok(requeued) => debug!(requeued, "ack-timeout scan requeued messages"),
                // Queue-wide failure: wait out the next interval and retry
                Err(e) => error!(error = %e, "ack-timeout scan failed"),
            }
        }
    }

    /// One scan pass. Returns how many messages were requeued.
    pub async fn scan_once(&self) -> Result<u32, StoreError> {
        let batch = self.queue.peek(self.batch_size).await?;
        let now = Utc::now();
        let mut requeued = 0u32;

        for mut message in batch {
            let Some(deadline) = message.ack_deadline else {
                continue; // not awaiting an ack
            };
            if deadline >= now {
                continue;
            }

            message.delivery_attempts += 1;
            message.ack_deadline = Some(now + self.ack_timeout);

            let result: Result<(), StoreError> = async {
                self.queue.remove(&message.message_id).await?;
                self.persistence.store(&message).await?;
                self.queue.enqueue(message.clone()).await?;
                Ok(())
            }
            .await;

            match result {
                Ok(()) => {
                    requeued += 1;
                    debug!(
                        message_id = %message.message_id,
                        attempts = message.delivery_attempts,
                        "expired message requeued"
                    );
                }
                Err(e) => {
                    warn!(
                        message_id = %message.message_id,
                        error = %e,
                        "failed to requeue expired message"
                    );
                }
            }
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_domain::{Message, TopicName};
    use hoist_store::{InMemoryPersistence, InMemoryQueue};

    fn monitor() -> (AckTimeoutMonitor, Arc<InMemoryQueue>, Arc<InMemoryPersistence>) {
        let queue = Arc::new(InMemoryQueue::new());
        let persistence = Arc::new(InMemoryPersistence::new());
        (
            AckTimeoutMonitor::new(
                queue.clone(),
                persistence.clone(),
                Duration::from_secs(30),
                Duration::from_millis(10),
            ),
            queue,
            persistence,
        )
    }

    fn message() -> Message {
        Message::new(TopicName::new("orders").unwrap(), "{}", 0).unwrap()
    }

    #[tokio::test]
    async fn expired_message_is_requeued_with_fresh_deadline() {
        let (monitor, queue, persistence) = monitor();
        let mut msg = message();
        msg.delivery_attempts = 2;
        msg.ack_deadline = Some(Utc::now() - chrono::Duration::seconds(1));
        persistence.store(&msg).await.unwrap();
        queue.enqueue(msg.clone()).await.unwrap();

        let requeued = monitor.scan_once().await.unwrap();
        assert_eq!(requeued, 1);

        let queued = queue.peek(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].message_id, msg.message_id);
        assert_eq!(queued[0].delivery_attempts, 3);
        assert!(queued[0].ack_deadline.unwrap() > Utc::now());

        // The persisted copy reflects the bump too
        let stored = persistence.retrieve(&msg.message_id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_attempts, 3);
    }

    #[tokio::test]
    async fn unexpired_and_deadline_free_messages_are_untouched() {
        let (monitor, queue, _) = monitor();

        let mut pending_ack = message();
        pending_ack.ack_deadline = Some(Utc::now() + chrono::Duration::seconds(60));
        queue.enqueue(pending_ack.clone()).await.unwrap();

        let no_deadline = message();
        queue.enqueue(no_deadline.clone()).await.unwrap();

        let requeued = monitor.scan_once().await.unwrap();
        assert_eq!(requeued, 0);

        let queued = queue.peek(10).await.unwrap();
        assert_eq!(queued[0].delivery_attempts, 0);
        assert_eq!(queued[1].delivery_attempts, 0);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancel() {
        let (monitor, _, _) = monitor();
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor must stop promptly")
            .unwrap();
    }
}

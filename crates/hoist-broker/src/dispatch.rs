use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hoist_domain::{
    DeliveryGuarantee, Message, MessageStatus, Subscription, SubscriptionType, Topic,
};
use hoist_store::{MessageQueue, PersistenceStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::delivery::{DeliverFn, DeliveryOptions, DeliveryService};
use crate::error::BrokerError;
use crate::exactly_once::ExactlyOnceDelivery;
use crate::router::Router;
use crate::topics::{SubscriptionRegistry, TopicRegistry};
use crate::transport::ConsumerTransport;

/// Background loop that drains the queue: route each pending message, then
/// push it to the selected consumers under the topic's delivery guarantee.
///
/// Pull subscriptions are never pushed to; their consumers drain via the
/// API. Messages routed to nobody stay queued until a consumer appears.
pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    persistence: Arc<dyn PersistenceStore>,
    topics: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    router: Arc<Router>,
    delivery: Arc<DeliveryService>,
    exactly_once: Arc<ExactlyOnceDelivery>,
    transport: Arc<dyn ConsumerTransport>,
    defaults: DeliveryOptions,
    interval: Duration,
    batch_size: u32,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        persistence: Arc<dyn PersistenceStore>,
        topics: Arc<TopicRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        router: Arc<Router>,
        delivery: Arc<DeliveryService>,
        exactly_once: Arc<ExactlyOnceDelivery>,
        transport: Arc<dyn ConsumerTransport>,
        defaults: DeliveryOptions,
    ) -> Self {
        Self {
            queue,
            persistence,
            topics,
            subscriptions,
            router,
            delivery,
            exactly_once,
            transport,
            defaults,
            interval: Duration::from_millis(250),
            batch_size: 50,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until cancelled. Dispatch errors are logged; the loop continues.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
            match self.dispatch_once(&cancel).await {
                Ok(0) => {}
                Ok(dispatched) => debug!(dispatched, "dispatch pass complete"),
                Err(BrokerError::Cancelled) => return,
                Err(e) => error!(error = %e, "dispatch pass failed"),
            }
        }
    }

    /// One pass over the head of the queue. Returns how many messages were
    /// claimed for delivery.
    pub async fn dispatch_once(&self, cancel: &CancellationToken) -> Result<u32, BrokerError> {
        let batch = self.queue.peek(self.batch_size).await?;
        let mut dispatched = 0u32;

        for message in batch {
            if cancel.is_cancelled() {
                return Err(BrokerError::Cancelled);
            }
            if message.status != MessageStatus::Pending {
                continue;
            }
            if message.ack_deadline.is_some() {
                continue; // in flight, the ack monitor owns it
            }
            if message.topic.is_dlq() {
                continue; // dead letters wait for replay
            }
            let Some(topic) = self.topics.get(&message.topic).await else {
                continue;
            };
            let subs = self.subscriptions.for_topic(&message.topic).await;
            let route = self.router.route(&message, &topic, &subs);
            if !route.success {
                continue;
            }

            let targets: Vec<Subscription> = route
                .consumer_ids
                .iter()
                .filter_map(|id| subs.iter().find(|s| &s.subscription_id == id))
                .filter(|s| s.subscription_type == SubscriptionType::Push)
                .cloned()
                .collect();
            if targets.is_empty() {
                continue; // pull-only consumers drain via the API
            }

            // Claim the message before pushing so a slow consumer does not
            // hold up re-reads of the same queue head.
            self.queue.remove(&message.message_id).await?;
            dispatched += 1;
            self.deliver_to_targets(message, &topic, &targets, cancel).await;
        }
        Ok(dispatched)
    }

    async fn deliver_to_targets(
        &self,
        message: Message,
        topic: &Topic,
        targets: &[Subscription],
        cancel: &CancellationToken,
    ) {
        for subscription in targets {
            let mut working = message.clone();
            let options = DeliveryOptions {
                max_retries: subscription.max_retries,
                ..self.defaults
            };
            let deliver_fn = self.make_deliver_fn(subscription.clone());

            let delivered = match topic.delivery_guarantee {
                DeliveryGuarantee::AtMostOnce => {
                    // One attempt, no retry, no DLQ.
                    working.delivery_attempts += 1;
                    match self.transport.deliver(subscription, &working).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(
                                message_id = %working.message_id,
                                error = %e,
                                "at-most-once delivery dropped"
                            );
                            working.status = MessageStatus::Failed;
                            false
                        }
                    }
                }
                DeliveryGuarantee::AtLeastOnce => {
                    match self
                        .delivery
                        .deliver_with_retry(
                            &mut working,
                            subscription.subscription_id,
                            &deliver_fn,
                            &options,
                            cancel,
                        )
                        .await
                    {
                        Ok(outcome) => outcome.is_success,
                        Err(e) => {
                            warn!(message_id = %working.message_id, error = %e, "delivery aborted");
                            false
                        }
                    }
                }
                DeliveryGuarantee::ExactlyOnce => {
                    match self
                        .exactly_once
                        .deliver(
                            &mut working,
                            subscription.subscription_id,
                            &deliver_fn,
                            &options,
                            cancel,
                        )
                        .await
                    {
                        Ok(outcome) => outcome.is_success,
                        Err(e) => {
                            warn!(message_id = %working.message_id, error = %e, "delivery aborted");
                            false
                        }
                    }
                }
            };

            if delivered {
                working.status = MessageStatus::Delivered;
                working.ack_deadline = Some(
                    Utc::now()
                        + chrono::Duration::seconds(subscription.ack_timeout_secs as i64),
                );
                if let Err(e) = self.persistence.store(&working).await {
                    warn!(message_id = %working.message_id, error = %e, "failed to persist delivery");
                }
                // Back onto the queue so the ack monitor can watch the deadline
                if let Err(e) = self.queue.enqueue(working.clone()).await {
                    warn!(message_id = %working.message_id, error = %e, "failed to requeue in-flight message");
                }
            } else if let Err(e) = self.persistence.store(&working).await {
                warn!(message_id = %working.message_id, error = %e, "failed to persist delivery failure");
            }
        }
    }

    fn make_deliver_fn(&self, subscription: Subscription) -> DeliverFn {
        let transport = self.transport.clone();
        Arc::new(move |message: Message| {
            let transport = transport.clone();
            let subscription = subscription.clone();
            Box::pin(async move { transport.deliver(&subscription, &message).await })
        })
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use hoist_domain::{Message, MessageStatus, SubscriptionId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dlq::DeadLetterService;
use crate::error::BrokerError;

/// One delivery attempt to a consumer. `Err` carries the failure detail;
/// panics upstream are converted to this by the transport layer.
pub type DeliverFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type DeliverFn = Arc<dyn Fn(Message) -> DeliverFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryOptions {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl DeliveryOptions {
    /// Delay after the `attempt`-th failure (1-based):
    /// `min(max_backoff, initial_backoff * multiplier^(attempt-1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.powi(exponent.min(i32::MAX as u32) as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        let capped = delay.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Result of one `deliver_with_retry` call.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub is_success: bool,
    /// The message's total attempt count after this call.
    pub delivery_attempts: u32,
    pub total_delay: Duration,
    pub consumer_id: Option<SubscriptionId>,
    pub moved_to_dlq: bool,
    pub error_message: Option<String>,
}

/// Per-message retry loop with exponential backoff and DLQ handoff.
///
/// Retries within one call are strictly sequential. The attempt budget is
/// `max_retries + 1` counted against the message's lifetime
/// `delivery_attempts`, so a redelivered message does not restart its budget.
#[derive(Clone)]
pub struct DeliveryService {
    dlq: Arc<DeadLetterService>,
}

impl DeliveryService {
    pub fn new(dlq: Arc<DeadLetterService>) -> Self {
        Self { dlq }
    }

    pub async fn deliver_with_retry(
        &self,
        message: &mut Message,
        consumer_id: SubscriptionId,
        deliver_fn: &DeliverFn,
        options: &DeliveryOptions,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, BrokerError> {
        let max_total_attempts = options.max_retries + 1;
        let mut total_delay = Duration::ZERO;
        let mut last_error: Option<String> = None;

        while message.delivery_attempts < max_total_attempts {
            if cancel.is_cancelled() {
                return Err(BrokerError::Cancelled);
            }

            message.delivery_attempts += 1;
            match deliver_fn(message.clone()).await {
                Ok(()) => {
                    message.status = MessageStatus::Delivered;
                    debug!(
                        message_id = %message.message_id,
                        attempts = message.delivery_attempts,
                        consumer = %consumer_id,
                        "message delivered"
                    );
                    return Ok(DeliveryOutcome {
                        is_success: true,
                        delivery_attempts: message.delivery_attempts,
                        total_delay,
                        consumer_id: Some(consumer_id),
                        moved_to_dlq: false,
                        error_message: None,
                    });
                }
                Err(error) => {
                    warn!(
                        message_id = %message.message_id,
                        attempt = message.delivery_attempts,
                        error = %error,
                        "delivery attempt failed"
                    );
                    last_error = Some(error);
                    if message.delivery_attempts < max_total_attempts {
                        let delay = options.backoff(message.delivery_attempts);
                        total_delay += delay;
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(BrokerError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        // Retries exhausted; terminate at the DLQ.
        let reason = last_error.clone().unwrap_or_default();
        let moved = self.dlq.move_to_dlq(message, &reason).await?;
        Ok(DeliveryOutcome {
            is_success: false,
            delivery_attempts: message.delivery_attempts,
            total_delay,
            consumer_id: Some(consumer_id),
            moved_to_dlq: moved,
            error_message: last_error,
        })
    }
}

use std::time::Duration;

use async_trait::async_trait;
use hoist_domain::{Message, Subscription};

/// Delivers one message to one consumer endpoint. `Err` carries the failure
/// detail used for retry logging and DLQ reasons.
#[async_trait]
pub trait ConsumerTransport: Send + Sync + 'static {
    async fn deliver(&self, subscription: &Subscription, message: &Message)
        -> Result<(), String>;
}

/// HTTP push transport: POSTs the message as JSON to the subscription's
/// consumer endpoint. Any 2xx response counts as delivered.
#[derive(Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpPushTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ConsumerTransport for HttpPushTransport {
    async fn deliver(
        &self,
        subscription: &Subscription,
        message: &Message,
    ) -> Result<(), String> {
        let response = self
            .client
            .post(&subscription.consumer_endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| format!("consumer unreachable: {e}"))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("consumer returned {}", response.status()))
        }
    }
}

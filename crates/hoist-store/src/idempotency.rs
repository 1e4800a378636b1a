use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hoist_domain::MessageId;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Processed-key set with a key → message-id mapping.
///
/// `mark_processed` is conditional: marking the same key twice is a no-op,
/// so concurrent markers converge on one record.
#[async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    async fn has_been_processed(&self, key: &str) -> Result<bool, StoreError>;

    async fn mark_processed(&self, key: &str, message_id: &MessageId)
        -> Result<(), StoreError>;

    /// The message id recorded for `key`, if any.
    async fn processed_message(&self, key: &str) -> Result<Option<MessageId>, StoreError>;
}

/// In-memory [`IdempotencyStore`]. All entries are lost on process exit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdempotencyStore {
    inner: Arc<RwLock<HashMap<String, MessageId>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn has_been_processed(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.contains_key(key))
    }

    async fn mark_processed(
        &self,
        key: &str,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.entry(key.to_string()).or_insert(*message_id);
        Ok(())
    }

    async fn processed_message(&self, key: &str) -> Result<Option<MessageId>, StoreError> {
        Ok(self.inner.read().await.get(key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_and_check() {
        let store = InMemoryIdempotencyStore::new();
        assert!(!store.has_been_processed("k").await.unwrap());

        let id = MessageId::new();
        store.mark_processed("k", &id).await.unwrap();
        assert!(store.has_been_processed("k").await.unwrap());
        assert_eq!(store.processed_message("k").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn second_mark_is_idempotent() {
        let store = InMemoryIdempotencyStore::new();
        let first = MessageId::new();
        let second = MessageId::new();

        store.mark_processed("k", &first).await.unwrap();
        store.mark_processed("k", &second).await.unwrap();

        // First writer wins; the duplicate mark changes nothing
        assert_eq!(store.processed_message("k").await.unwrap(), Some(first));
    }
}

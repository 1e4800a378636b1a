use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use hoist_domain::{ExecutionId, Message, MessageId, TopicName};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::ExecutionState;
use crate::store::{MessageQueue, PersistenceStore, TrackerStore};

// ── Message persistence ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PersistenceInner {
    messages: HashMap<MessageId, Message>,
    /// Insertion order per topic, so `get_by_topic` is stable.
    topic_order: HashMap<TopicName, Vec<MessageId>>,
}

/// In-memory implementation of [`PersistenceStore`].
///
/// All data is lost on process exit. Suitable for tests and ephemeral serves.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    inner: Arc<RwLock<PersistenceInner>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistence {
    async fn store(&self, msg: &Message) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let order = guard.topic_order.entry(msg.topic.clone()).or_default();
        if !order.contains(&msg.message_id) {
            order.push(msg.message_id);
        }
        guard.messages.insert(msg.message_id, msg.clone());
        Ok(())
    }

    async fn retrieve(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.messages.get(id).cloned())
    }

    async fn get_by_topic(
        &self,
        topic: &TopicName,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let guard = self.inner.read().await;
        let ids = match guard.topic_order.get(topic) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| guard.messages.get(id))
            // A replayed message may have moved topics since it was indexed.
            .filter(|m| &m.topic == topic)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &MessageId) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        match guard.messages.remove(id) {
            Some(msg) => {
                if let Some(order) = guard.topic_order.get_mut(&msg.topic) {
                    order.retain(|m| m != id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ── Message queue ─────────────────────────────────────────────────────────────

/// In-memory FIFO implementation of [`MessageQueue`] with an optional
/// capacity bound.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    inner: Arc<RwLock<VecDeque<Message>>>,
    capacity: Option<usize>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(VecDeque::new())), capacity: None }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::new())),
            capacity: Some(capacity),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn enqueue(&self, msg: Message) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(capacity) = self.capacity {
            if guard.len() >= capacity {
                return Err(StoreError::QueueFull { capacity });
            }
        }
        guard.push_back(msg);
        Ok(())
    }

    async fn peek(&self, limit: u32) -> Result<Vec<Message>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.iter().take(limit as usize).cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.len() as u64)
    }

    async fn remove(&self, id: &MessageId) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|m| &m.message_id != id);
        Ok(guard.len() < before)
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// In-memory implementation of [`TrackerStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTracker {
    inner: Arc<RwLock<HashMap<ExecutionId, ExecutionState>>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for InMemoryTracker {
    async fn get_execution(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionState>, StoreError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionState>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<ExecutionState> = guard.values().cloned().collect();
        all.sort_by_key(|s| s.started_at);
        Ok(all)
    }

    async fn upsert_execution(&self, state: &ExecutionState) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.insert(state.execution_id, state.clone());
        Ok(())
    }
}

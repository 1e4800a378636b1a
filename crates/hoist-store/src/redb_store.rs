use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hoist_domain::{ExecutionId, Message, MessageId, TopicName};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::state::ExecutionState;
use crate::store::{PersistenceStore, TrackerStore};

const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");
/// Storage-order index: sequence → message id. Entries for deleted messages
/// are skipped on read.
const MESSAGE_SEQ: TableDefinition<u64, &str> = TableDefinition::new("message_seq");
const EXECUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("executions");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Persistent message and execution store backed by a redb database file.
///
/// All state survives process restarts. Suitable for single-node production use.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        let db = Database::create(path)
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        // Ensure tables exist
        {
            let wtxn = db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(MESSAGES).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(MESSAGE_SEQ).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(EXECUTIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(META).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl PersistenceStore for RedbStore {
    async fn store(&self, msg: &Message) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(msg)?;
        let key = msg.message_id.to_string();
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut messages =
                wtxn.open_table(MESSAGES).map_err(|e| StoreError::Internal(e.to_string()))?;
            let existed = messages
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Internal(e.to_string()))?
                .is_some();

            // Only first-time stores get a sequence entry; upserts keep their slot.
            if !existed {
                let mut meta =
                    wtxn.open_table(META).map_err(|e| StoreError::Internal(e.to_string()))?;
                let seq = meta
                    .get("msg_seq")
                    .map_err(|e| StoreError::Internal(e.to_string()))?
                    .map(|g| g.value())
                    .unwrap_or(0);
                let new_seq = seq + 1;
                meta.insert("msg_seq", new_seq)
                    .map_err(|e| StoreError::Internal(e.to_string()))?;

                let mut seq_table = wtxn
                    .open_table(MESSAGE_SEQ)
                    .map_err(|e| StoreError::Internal(e.to_string()))?;
                seq_table
                    .insert(new_seq, key.as_str())
                    .map_err(|e| StoreError::Internal(e.to_string()))?;
            }
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn retrieve(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let table = rtxn.open_table(MESSAGES).map_err(|e| StoreError::Internal(e.to_string()))?;
        match table
            .get(id.to_string().as_str())
            .map_err(|e| StoreError::Internal(e.to_string()))?
        {
            Some(guard) => {
                let msg: Message = serde_json::from_slice(guard.value())?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    async fn get_by_topic(
        &self,
        topic: &TopicName,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let seq_table =
            rtxn.open_table(MESSAGE_SEQ).map_err(|e| StoreError::Internal(e.to_string()))?;
        let messages =
            rtxn.open_table(MESSAGES).map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut results = Vec::new();
        for entry in seq_table.iter().map_err(|e| StoreError::Internal(e.to_string()))? {
            if results.len() >= limit as usize {
                break;
            }
            let (_seq, id) = entry.map_err(|e| StoreError::Internal(e.to_string()))?;
            let Some(guard) = messages
                .get(id.value())
                .map_err(|e| StoreError::Internal(e.to_string()))?
            else {
                continue; // deleted since indexing
            };
            let msg: Message = serde_json::from_slice(guard.value())?;
            if &msg.topic == topic {
                results.push(msg);
            }
        }
        Ok(results)
    }

    async fn delete(&self, id: &MessageId) -> Result<bool, StoreError> {
        let key = id.to_string();
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        let existed;
        {
            let mut table =
                wtxn.open_table(MESSAGES).map_err(|e| StoreError::Internal(e.to_string()))?;
            existed = table
                .remove(key.as_str())
                .map_err(|e| StoreError::Internal(e.to_string()))?
                .is_some();
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(existed)
    }
}

#[async_trait]
impl TrackerStore for RedbStore {
    async fn get_execution(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionState>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let table =
            rtxn.open_table(EXECUTIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
        match table
            .get(id.to_string().as_str())
            .map_err(|e| StoreError::Internal(e.to_string()))?
        {
            Some(guard) => {
                let state: ExecutionState = serde_json::from_slice(guard.value())?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionState>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let table =
            rtxn.open_table(EXECUTIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(|e| StoreError::Internal(e.to_string()))? {
            let (_k, v) = entry.map_err(|e| StoreError::Internal(e.to_string()))?;
            let state: ExecutionState = serde_json::from_slice(v.value())?;
            results.push(state);
        }
        results.sort_by_key(|s| s.started_at);
        Ok(results)
    }

    async fn upsert_execution(&self, state: &ExecutionState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        let key = state.execution_id.to_string();
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut table =
                wtxn.open_table(EXECUTIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }
}

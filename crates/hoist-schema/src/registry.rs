use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hoist_domain::{MessageSchema, SchemaId, SchemaStatus};
use tokio::sync::RwLock;

use crate::error::SchemaError;

/// In-memory schema store with a version history per schema id.
///
/// Mutations are serialised under a registry-wide write lock; reads share a
/// read lock. Status transition *policy* (which source states are legal for
/// approval-flow moves) lives in the approval service; the registry only
/// enforces the invariants that hold unconditionally: unique ids, an actor
/// on approval, and no deletion of non-Draft schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// Versions stored in ascending order; the last entry is current.
    inner: Arc<RwLock<HashMap<SchemaId, Vec<MessageSchema>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brand-new schema id. The stored entry becomes version 1 in
    /// Draft. Rejects duplicate ids and blank definitions.
    pub async fn register(&self, mut schema: MessageSchema) -> Result<MessageSchema, SchemaError> {
        if schema.definition.trim().is_empty() {
            return Err(SchemaError::EmptyDefinition);
        }
        let mut guard = self.inner.write().await;
        if guard.contains_key(&schema.schema_id) {
            return Err(SchemaError::Duplicate(schema.schema_id));
        }
        schema.version = 1;
        schema.status = SchemaStatus::Draft;
        schema.created_at = Utc::now();
        schema.approved_by = None;
        schema.approved_at = None;
        guard.insert(schema.schema_id.clone(), vec![schema.clone()]);
        Ok(schema)
    }

    /// The current (highest) version for `id`.
    pub async fn get(&self, id: &SchemaId) -> Option<MessageSchema> {
        let guard = self.inner.read().await;
        guard.get(id).and_then(|versions| versions.last().cloned())
    }

    pub async fn get_version(&self, id: &SchemaId, version: u32) -> Option<MessageSchema> {
        let guard = self.inner.read().await;
        guard
            .get(id)
            .and_then(|versions| versions.iter().find(|s| s.version == version).cloned())
    }

    /// Full version history for `id`, ascending.
    pub async fn history(&self, id: &SchemaId) -> Vec<MessageSchema> {
        let guard = self.inner.read().await;
        guard.get(id).cloned().unwrap_or_default()
    }

    /// Current version of every registered schema.
    pub async fn list(&self) -> Vec<MessageSchema> {
        let guard = self.inner.read().await;
        let mut all: Vec<MessageSchema> = guard
            .values()
            .filter_map(|versions| versions.last().cloned())
            .collect();
        all.sort_by(|a, b| a.schema_id.as_str().cmp(b.schema_id.as_str()));
        all
    }

    /// Append the next version for an existing id. The new entry's version is
    /// assigned by the registry; `status` is taken from the argument.
    pub(crate) async fn submit_version(
        &self,
        mut schema: MessageSchema,
    ) -> Result<MessageSchema, SchemaError> {
        if schema.definition.trim().is_empty() {
            return Err(SchemaError::EmptyDefinition);
        }
        let mut guard = self.inner.write().await;
        let versions = guard
            .get_mut(&schema.schema_id)
            .ok_or_else(|| SchemaError::NotFound(schema.schema_id.clone()))?;
        let next = versions.last().map(|s| s.version).unwrap_or(0) + 1;
        schema.version = next;
        schema.created_at = Utc::now();
        versions.push(schema.clone());
        Ok(schema)
    }

    /// Transition the current version of `id` to `status`.
    ///
    /// Approval requires a non-empty actor and stamps `approved_by` /
    /// `approved_at`. Any other transition is permitted here; the approval
    /// service enforces the workflow policy.
    pub async fn update_status(
        &self,
        id: &SchemaId,
        status: SchemaStatus,
        actor: Option<&str>,
    ) -> Result<MessageSchema, SchemaError> {
        let mut guard = self.inner.write().await;
        let versions = guard
            .get_mut(id)
            .ok_or_else(|| SchemaError::NotFound(id.clone()))?;
        let current = versions
            .last_mut()
            .ok_or_else(|| SchemaError::NotFound(id.clone()))?;
        apply_status(current, status, actor)?;
        Ok(current.clone())
    }

    /// Transition a specific version of `id` to `status`. Used by the
    /// approval service to deprecate a superseded approved version.
    pub(crate) async fn update_version_status(
        &self,
        id: &SchemaId,
        version: u32,
        status: SchemaStatus,
        actor: Option<&str>,
    ) -> Result<(), SchemaError> {
        let mut guard = self.inner.write().await;
        let versions = guard
            .get_mut(id)
            .ok_or_else(|| SchemaError::NotFound(id.clone()))?;
        let entry = versions
            .iter_mut()
            .find(|s| s.version == version)
            .ok_or_else(|| SchemaError::NotFound(id.clone()))?;
        apply_status(entry, status, actor)
    }

    /// Remove `id` entirely. Only legal while every version is still Draft.
    pub async fn delete(&self, id: &SchemaId) -> Result<(), SchemaError> {
        let mut guard = self.inner.write().await;
        let versions = guard
            .get(id)
            .ok_or_else(|| SchemaError::NotFound(id.clone()))?;
        if let Some(non_draft) = versions.iter().find(|s| s.status != SchemaStatus::Draft) {
            return Err(SchemaError::UnsafeDelete { status: non_draft.status });
        }
        guard.remove(id);
        Ok(())
    }
}

fn apply_status(
    schema: &mut MessageSchema,
    status: SchemaStatus,
    actor: Option<&str>,
) -> Result<(), SchemaError> {
    if status == SchemaStatus::Approved {
        let actor = actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(SchemaError::MissingActor(SchemaStatus::Approved))?;
        schema.approved_by = Some(actor.to_string());
        schema.approved_at = Some(Utc::now());
    }
    schema.status = status;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_domain::CompatibilityMode;

    fn draft(id: &str) -> MessageSchema {
        MessageSchema::new(
            SchemaId::new(id).unwrap(),
            r#"{ "type": "object" }"#,
            CompatibilityMode::Backward,
        )
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = SchemaRegistry::new();
        let stored = registry.register(draft("orders")).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, SchemaStatus::Draft);

        let got = registry.get(&SchemaId::new("orders").unwrap()).await;
        assert_eq!(got, Some(stored));
    }

    #[tokio::test]
    async fn duplicate_id_conflicts() {
        let registry = SchemaRegistry::new();
        registry.register(draft("orders")).await.unwrap();
        let err = registry.register(draft("orders")).await.unwrap_err();
        assert!(matches!(err, SchemaError::Duplicate(_)));
    }

    #[tokio::test]
    async fn blank_definition_rejected() {
        let registry = SchemaRegistry::new();
        let mut schema = draft("orders");
        schema.definition = "   ".to_string();
        let err = registry.register(schema).await.unwrap_err();
        assert!(matches!(err, SchemaError::EmptyDefinition));
    }

    #[tokio::test]
    async fn approval_requires_actor() {
        let registry = SchemaRegistry::new();
        let id = SchemaId::new("orders").unwrap();
        registry.register(draft("orders")).await.unwrap();

        let err = registry
            .update_status(&id, SchemaStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingActor(_)));
        let err = registry
            .update_status(&id, SchemaStatus::Approved, Some("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingActor(_)));

        let approved = registry
            .update_status(&id, SchemaStatus::Approved, Some("alex"))
            .await
            .unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some("alex"));
        assert!(approved.approved_at.is_some());
    }

    #[tokio::test]
    async fn delete_only_drafts() {
        let registry = SchemaRegistry::new();
        let id = SchemaId::new("orders").unwrap();
        registry.register(draft("orders")).await.unwrap();
        registry.delete(&id).await.unwrap();
        assert!(registry.get(&id).await.is_none());

        registry.register(draft("orders")).await.unwrap();
        registry
            .update_status(&id, SchemaStatus::Approved, Some("alex"))
            .await
            .unwrap();
        let err = registry.delete(&id).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsafeDelete { status: SchemaStatus::Approved }
        ));
    }

    #[tokio::test]
    async fn versions_are_assigned_sequentially() {
        let registry = SchemaRegistry::new();
        let id = SchemaId::new("orders").unwrap();
        registry.register(draft("orders")).await.unwrap();

        let v2 = registry.submit_version(draft("orders")).await.unwrap();
        assert_eq!(v2.version, 2);
        let v3 = registry.submit_version(draft("orders")).await.unwrap();
        assert_eq!(v3.version, 3);

        assert_eq!(registry.get(&id).await.unwrap().version, 3);
        assert_eq!(registry.history(&id).await.len(), 3);
        assert_eq!(registry.get_version(&id, 2).await.unwrap().version, 2);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hoist_domain::{
    ApprovalRequest, ApprovalStatus, CompatibilityMode, MessageSchema, SchemaId, SchemaStatus,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::compat::{check_compatibility, definition_fingerprint};
use crate::error::SchemaError;
use crate::registry::SchemaRegistry;

/// Orchestrates the schema approval workflow over the registry and the
/// compatibility checker.
///
/// First versions and non-breaking changes auto-approve; breaking changes
/// park the new version in PendingApproval until an approver decides.
#[derive(Debug, Clone)]
pub struct SchemaApprovalService {
    registry: Arc<SchemaRegistry>,
    requests: Arc<RwLock<HashMap<SchemaId, ApprovalRequest>>>,
}

impl SchemaApprovalService {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry, requests: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Submit `definition` as the next version of `id`.
    ///
    /// - No prior schema for `id`: registered and approved immediately.
    /// - Identical definition (canonical fingerprint match): auto-approved
    ///   without creating a new version.
    /// - Compatible change: new version stored as Approved; the superseded
    ///   approved version is deprecated.
    /// - Breaking change: new version stored as PendingApproval and a Pending
    ///   request recorded for the approvers.
    pub async fn request_approval(
        &self,
        id: &SchemaId,
        definition: &str,
        compatibility: CompatibilityMode,
        requested_by: &str,
        approvers: &[String],
    ) -> Result<ApprovalRequest, SchemaError> {
        if requested_by.trim().is_empty() {
            return Err(SchemaError::EmptyRequester);
        }
        if approvers.is_empty() {
            return Err(SchemaError::EmptyApprovers);
        }

        let current = self.registry.get(id).await;

        let request = match current {
            None => {
                // First version: register then approve directly.
                let schema =
                    MessageSchema::new(id.clone(), definition, compatibility);
                self.registry.register(schema).await?;
                self.registry
                    .update_status(id, SchemaStatus::Approved, Some(requested_by))
                    .await?;
                info!(schema_id = %id, "first schema version auto-approved");
                self.build_request(id, requested_by, approvers, false, Vec::new(), ApprovalStatus::AutoApproved)
            }
            Some(current) => {
                if definition_fingerprint(&current.definition)?
                    == definition_fingerprint(definition)?
                {
                    debug!(schema_id = %id, "identical definition re-submitted; no new version");
                    return Ok(self.build_request(
                        id,
                        requested_by,
                        approvers,
                        false,
                        Vec::new(),
                        ApprovalStatus::AutoApproved,
                    ));
                }

                let check = check_compatibility(&current.definition, definition, compatibility)?;
                let mut schema = MessageSchema::new(id.clone(), definition, compatibility);

                if check.is_compatible {
                    schema.status = SchemaStatus::Approved;
                    let stored = self.registry.submit_version(schema).await?;
                    self.registry
                        .update_version_status(
                            id,
                            stored.version,
                            SchemaStatus::Approved,
                            Some(requested_by),
                        )
                        .await?;
                    self.deprecate_superseded(id, stored.version).await?;
                    info!(schema_id = %id, version = stored.version, "compatible schema change auto-approved");
                    self.build_request(id, requested_by, approvers, false, Vec::new(), ApprovalStatus::AutoApproved)
                } else {
                    schema.status = SchemaStatus::PendingApproval;
                    let stored = self.registry.submit_version(schema).await?;
                    info!(
                        schema_id = %id,
                        version = stored.version,
                        breaking = check.breaking_changes.len(),
                        "breaking schema change pending approval"
                    );
                    self.build_request(
                        id,
                        requested_by,
                        approvers,
                        true,
                        check.breaking_changes,
                        ApprovalStatus::Pending,
                    )
                }
            }
        };

        self.requests.write().await.insert(id.clone(), request.clone());
        Ok(request)
    }

    /// Approve the pending version of `id`. Returns false when the schema
    /// does not exist; errors when the current version is not pending.
    pub async fn approve_schema(
        &self,
        id: &SchemaId,
        approved_by: &str,
    ) -> Result<bool, SchemaError> {
        let Some(current) = self.registry.get(id).await else {
            return Ok(false);
        };
        if current.status != SchemaStatus::PendingApproval {
            return Err(SchemaError::IllegalTransition {
                from: current.status,
                to: SchemaStatus::Approved,
            });
        }

        self.registry
            .update_status(id, SchemaStatus::Approved, Some(approved_by))
            .await?;
        self.deprecate_superseded(id, current.version).await?;
        self.finish_request(id, ApprovalStatus::Approved).await;
        info!(schema_id = %id, version = current.version, approver = approved_by, "schema approved");
        Ok(true)
    }

    /// Reject the pending version of `id`. Returns false when the schema
    /// does not exist; errors when the current version is not pending.
    pub async fn reject_schema(
        &self,
        id: &SchemaId,
        rejected_by: &str,
    ) -> Result<bool, SchemaError> {
        let Some(current) = self.registry.get(id).await else {
            return Ok(false);
        };
        if current.status != SchemaStatus::PendingApproval {
            return Err(SchemaError::IllegalTransition {
                from: current.status,
                to: SchemaStatus::Rejected,
            });
        }

        self.registry.update_status(id, SchemaStatus::Rejected, None).await?;
        self.finish_request(id, ApprovalStatus::Rejected).await;
        info!(schema_id = %id, version = current.version, approver = rejected_by, "schema rejected");
        Ok(true)
    }

    /// Deprecate the approved version of `id`. Returns false when the schema
    /// does not exist; errors when the current version is not approved.
    pub async fn deprecate_schema(&self, id: &SchemaId) -> Result<bool, SchemaError> {
        let Some(current) = self.registry.get(id).await else {
            return Ok(false);
        };
        if current.status != SchemaStatus::Approved {
            return Err(SchemaError::IllegalTransition {
                from: current.status,
                to: SchemaStatus::Deprecated,
            });
        }
        self.registry.update_status(id, SchemaStatus::Deprecated, None).await?;
        Ok(true)
    }

    /// The most recent approval request for `id`.
    pub async fn get_request(&self, id: &SchemaId) -> Option<ApprovalRequest> {
        self.requests.read().await.get(id).cloned()
    }

    // Any approved version below `keep_version` is superseded once
    // `keep_version` is approved.
    async fn deprecate_superseded(
        &self,
        id: &SchemaId,
        keep_version: u32,
    ) -> Result<(), SchemaError> {
        let history = self.registry.history(id).await;
        for schema in history {
            if schema.version < keep_version && schema.status == SchemaStatus::Approved {
                self.registry
                    .update_version_status(id, schema.version, SchemaStatus::Deprecated, None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish_request(&self, id: &SchemaId, status: ApprovalStatus) {
        let mut guard = self.requests.write().await;
        if let Some(request) = guard.get_mut(id) {
            request.status = status;
        }
    }

    fn build_request(
        &self,
        id: &SchemaId,
        requested_by: &str,
        approvers: &[String],
        requires_approval: bool,
        breaking_changes: Vec<hoist_domain::BreakingChange>,
        status: ApprovalStatus,
    ) -> ApprovalRequest {
        ApprovalRequest {
            schema_id: id.clone(),
            requested_by: requested_by.to_string(),
            approvers: approvers.to_vec(),
            requires_approval,
            breaking_changes,
            status,
            requested_at: Utc::now(),
        }
    }
}

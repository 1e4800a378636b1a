use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SchemaId;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Schema lifecycle.
///
/// Transitions:
///   Draft → PendingApproval → Approved → Deprecated
///   PendingApproval → Rejected
///   Draft → Approved (first version / non-breaking auto-approval)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    #[default]
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Deprecated,
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchemaStatus::Draft => "draft",
            SchemaStatus::PendingApproval => "pending_approval",
            SchemaStatus::Approved => "approved",
            SchemaStatus::Rejected => "rejected",
            SchemaStatus::Deprecated => "deprecated",
        };
        write!(f, "{}", s)
    }
}

/// What kinds of change are permitted between adjacent schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityMode {
    None,
    #[default]
    Backward,
    Forward,
    Full,
}

impl std::fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompatibilityMode::None => write!(f, "none"),
            CompatibilityMode::Backward => write!(f, "backward"),
            CompatibilityMode::Forward => write!(f, "forward"),
            CompatibilityMode::Full => write!(f, "full"),
        }
    }
}

/// One version of a message schema. `definition` is a JSON Schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSchema {
    pub schema_id: SchemaId,
    pub definition: String,
    pub version: u32,
    pub status: SchemaStatus,
    pub compatibility: CompatibilityMode,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl MessageSchema {
    pub fn new(
        schema_id: SchemaId,
        definition: impl Into<String>,
        compatibility: CompatibilityMode,
    ) -> Self {
        Self {
            schema_id,
            definition: definition.into(),
            version: 1,
            status: SchemaStatus::Draft,
            compatibility,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
        }
    }
}

// ── Breaking changes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingChangeType {
    AddedRequiredField,
    RemovedField,
    TypeChanged,
    RemovedEnumValue,
    ConstraintNarrowed,
}

impl std::fmt::Display for BreakingChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakingChangeType::AddedRequiredField => "added_required_field",
            BreakingChangeType::RemovedField => "removed_field",
            BreakingChangeType::TypeChanged => "type_changed",
            BreakingChangeType::RemovedEnumValue => "removed_enum_value",
            BreakingChangeType::ConstraintNarrowed => "constraint_narrowed",
        };
        write!(f, "{}", s)
    }
}

/// One incompatibility found between two schema versions. `path` is a
/// JSON-pointer-like location, e.g. `$.customer.email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakingChange {
    pub change_type: BreakingChangeType,
    pub path: String,
    pub description: String,
}

// ── Approval workflow ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::AutoApproved => "auto_approved",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub schema_id: SchemaId,
    pub requested_by: String,
    pub approvers: Vec<String>,
    pub requires_approval: bool,
    pub breaking_changes: Vec<BreakingChange>,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
}

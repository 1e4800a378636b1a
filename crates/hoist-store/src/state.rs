use chrono::{DateTime, Utc};
use hoist_domain::{DeploymentRequest, ExecutionId, StrategyKind};
use serde::{Deserialize, Serialize};

// ── Execution status ──────────────────────────────────────────────────────────

/// The lifecycle of one pipeline execution.
///
/// Transitions:
///   Running ↔ PendingApproval
///   Running → Succeeded | Failed | RolledBack | Cancelled
/// Terminal statuses are sticky; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    PendingApproval,
    Succeeded,
    Failed,
    RolledBack,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::RolledBack
                | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::PendingApproval => "pending_approval",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::RolledBack => "rolled_back",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

// ── Stage results ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one pipeline stage, recorded in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set on the Deploy stage only.
    pub strategy: Option<StrategyKind>,
    pub nodes_deployed: u32,
    pub nodes_failed: u32,
    pub message: String,
}

impl StageResult {
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            strategy: None,
            nodes_deployed: 0,
            nodes_failed: 0,
            message: String::new(),
        }
    }

    pub fn finish(&mut self, status: StageStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
        self.finished_at = Some(Utc::now());
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            started_at: now,
            finished_at: Some(now),
            strategy: None,
            nodes_deployed: 0,
            nodes_failed: 0,
            message: message.into(),
        }
    }
}

// ── ExecutionState ────────────────────────────────────────────────────────────

/// Everything the tracker knows about one pipeline execution. Exactly one
/// state exists per execution id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: ExecutionId,
    pub request: DeploymentRequest,
    pub status: ExecutionStatus,
    pub stages: Vec<StageResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new(request: DeploymentRequest) -> Self {
        Self {
            execution_id: request.execution_id,
            request,
            status: ExecutionStatus::Running,
            stages: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Transition to `status`. Returns false (and leaves the state untouched)
    /// when the current status is terminal; transitions are monotonic.
    pub fn set_status(&mut self, status: ExecutionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.status = status;
        true
    }

    pub fn push_stage(&mut self, stage: StageResult) {
        self.stages.push(stage);
    }

    /// The most recently recorded stage, if any.
    pub fn last_stage(&self) -> Option<&StageResult> {
        self.stages.last()
    }

    pub fn last_stage_mut(&mut self) -> Option<&mut StageResult> {
        self.stages.last_mut()
    }
}

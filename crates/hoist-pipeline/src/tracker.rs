use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hoist_domain::ExecutionId;
use hoist_store::{ExecutionState, StoreError, TrackerStore};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

/// How the approval gate resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    TimedOut,
    Cancelled,
}

/// Execution state persistence plus the live coordination surface of the
/// pipeline: per-execution approval gates and cancellation tokens.
///
/// State goes through the injected [`TrackerStore`]; gates and tokens are
/// in-process only and die with the orchestrator.
pub struct DeploymentTracker {
    store: Arc<dyn TrackerStore>,
    gates: Mutex<HashMap<ExecutionId, watch::Sender<Option<bool>>>>,
    cancels: Mutex<HashMap<ExecutionId, CancellationToken>>,
}

impl DeploymentTracker {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self {
            store,
            gates: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    // ── State persistence ─────────────────────────────────────────────────────

    pub async fn save(&self, state: &ExecutionState) -> Result<(), StoreError> {
        self.store.upsert_execution(state).await
    }

    pub async fn get_state(&self, id: &ExecutionId) -> Result<Option<ExecutionState>, StoreError> {
        self.store.get_execution(id).await
    }

    /// Terminal executions only; `None` while still running.
    pub async fn get_result(&self, id: &ExecutionId) -> Result<Option<ExecutionState>, StoreError> {
        Ok(self
            .store
            .get_execution(id)
            .await?
            .filter(|s| s.status.is_terminal()))
    }

    /// Whether `id` exists and has not reached a terminal status.
    pub async fn in_progress(&self, id: &ExecutionId) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_execution(id)
            .await?
            .map_or(false, |s| !s.status.is_terminal()))
    }

    pub async fn list(&self) -> Result<Vec<ExecutionState>, StoreError> {
        self.store.list_executions().await
    }

    pub async fn list_in_progress(&self) -> Result<Vec<ExecutionState>, StoreError> {
        Ok(self
            .store
            .list_executions()
            .await?
            .into_iter()
            .filter(|s| !s.status.is_terminal())
            .collect())
    }

    // ── Approval gate ─────────────────────────────────────────────────────────

    /// Park until an external approval signal, a timeout, or cancellation.
    /// The gate is registered before waiting so a signal can never be lost.
    pub async fn wait_for_approval(
        &self,
        id: ExecutionId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ApprovalDecision {
        let (tx, mut rx) = watch::channel(None);
        self.gates.lock().await.insert(id, tx);

        let decision = tokio::select! {
            _ = cancel.cancelled() => ApprovalDecision::Cancelled,
            _ = tokio::time::sleep(timeout) => ApprovalDecision::TimedOut,
            signalled = rx.wait_for(|v| v.is_some()) => match signalled {
                Ok(value) => {
                    if value.unwrap_or(false) {
                        ApprovalDecision::Approved
                    } else {
                        ApprovalDecision::Rejected
                    }
                }
                // Sender dropped without a signal
                Err(_) => ApprovalDecision::TimedOut,
            },
        };

        self.gates.lock().await.remove(&id);
        decision
    }

    /// Deliver an approval signal. Returns false when no execution is parked
    /// at the gate.
    pub async fn signal_approval(&self, id: &ExecutionId, approved: bool) -> bool {
        let gates = self.gates.lock().await;
        match gates.get(id) {
            Some(tx) => tx.send(Some(approved)).is_ok(),
            None => false,
        }
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    pub async fn register_cancel(&self, id: ExecutionId, token: CancellationToken) {
        self.cancels.lock().await.insert(id, token);
    }

    pub async fn remove_cancel(&self, id: &ExecutionId) {
        self.cancels.lock().await.remove(id);
    }

    /// Request cancellation of a running execution. Returns false when the
    /// execution is not live in this process.
    pub async fn cancel(&self, id: &ExecutionId) -> bool {
        let cancels = self.cancels.lock().await;
        match cancels.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

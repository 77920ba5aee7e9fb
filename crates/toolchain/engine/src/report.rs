//! Outcome reports of engine passes

use chrono::{DateTime, Utc};
use toolchain_components::LifecycleOp;
use toolchain_types::ChangeId;

/// Outcome of a completed install or upgrade batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub change_id: ChangeId,
    pub operation: LifecycleOp,
    /// Components the batch acted on, in order
    pub applied: Vec<String>,
    /// Components the batch's predicate excluded
    pub skipped: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub(crate) fn new(change_id: ChangeId, operation: LifecycleOp) -> Self {
        Self {
            change_id,
            operation,
            applied: Vec::new(),
            skipped: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Where a compensation pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackHalt {
    pub component: String,
    pub reason: String,
}

/// Outcome of a compensation pass.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    /// Id minted for the compensating batch
    pub change_id: ChangeId,
    /// Id of the batch being compensated
    pub failed_change_id: ChangeId,
    /// Components moved to `reverted`, in registry order
    pub reverted: Vec<String>,
    /// Set when an error ended the pass early
    pub halted: Option<RollbackHalt>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }
}

/// Outcome of a teardown.
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub uninstalled: Vec<String>,
    /// Components that were never installed
    pub skipped: Vec<String>,
    /// Components whose teardown task failed or panicked
    pub failed: Vec<String>,
}

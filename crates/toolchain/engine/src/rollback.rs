//! Compensation of failed change batches
//!
//! A failed install or upgrade leaves some components moved by the batch.
//! The controller walks the whole registry and rolls back exactly those
//! components that reached `upgraded` under the failed batch's id. A
//! component that was only ever `installed` has no earlier release to
//! return to and is left alone.

use crate::error::{EngineError, Result};
use crate::report::{RollbackHalt, RollbackReport};
use toolchain_components::{ComponentRegistry, Dispatcher, LifecycleOp, RegisteredComponent};
use toolchain_state::StateStore;
use toolchain_types::{ChangeId, ComponentStatus, ToolchainId};
use tracing::{debug, error, info, instrument};

/// Rolls back the components a failed batch upgraded.
pub struct RollbackController<'a> {
    toolchain: &'a ToolchainId,
    store: &'a StateStore,
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> RollbackController<'a> {
    pub fn new(
        toolchain: &'a ToolchainId,
        store: &'a StateStore,
        dispatcher: &'a dyn Dispatcher,
    ) -> Self {
        Self {
            toolchain,
            store,
            dispatcher,
        }
    }

    /// Run one compensation pass for the batch `failed`.
    ///
    /// The first error ends the pass. It is logged and reported, never
    /// retried, so the toolchain may be left partly reverted.
    #[instrument(skip(self, registry), fields(toolchain = %self.toolchain))]
    pub async fn compensate(
        &self,
        registry: &ComponentRegistry,
        failed: &ChangeId,
    ) -> RollbackReport {
        let mut report = RollbackReport {
            change_id: ChangeId::generate(),
            failed_change_id: failed.clone(),
            reverted: Vec::new(),
            halted: None,
        };
        info!(
            change_id = %report.change_id,
            failed_change_id = %failed,
            "Starting compensation pass"
        );

        for entry in registry {
            match self.revert(entry, failed, &report.change_id).await {
                Ok(true) => report.reverted.push(entry.name().to_string()),
                Ok(false) => {}
                Err(e) => {
                    error!(
                        component = entry.name(),
                        error = %e,
                        "Compensation pass halted"
                    );
                    report.halted = Some(RollbackHalt {
                        component: entry.name().to_string(),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        info!(
            change_id = %report.change_id,
            reverted = report.reverted.len(),
            complete = report.is_complete(),
            "Compensation pass finished"
        );
        report
    }

    /// Roll back one component if the failed batch upgraded it.
    async fn revert(
        &self,
        entry: &RegisteredComponent,
        failed: &ChangeId,
        change_id: &ChangeId,
    ) -> Result<bool> {
        let name = entry.name();
        let status = self.store.component_status(self.toolchain, name).await?;
        if status != ComponentStatus::Upgraded {
            return Ok(false);
        }
        let last = self.store.component_change_id(self.toolchain, name).await?;
        if last.as_ref() != Some(failed) {
            debug!(component = name, "Upgraded by another batch, leaving as is");
            return Ok(false);
        }

        entry
            .component()
            .rollback(self.dispatcher, self.toolchain.namespace())
            .await
            .map_err(|e| EngineError::adapter(name, LifecycleOp::Rollback, e))?;
        self.store
            .record_transition(self.toolchain, name, ComponentStatus::Reverted, change_id)
            .await?;
        info!(component = name, change_id = %change_id, "Component reverted");
        Ok(true)
    }
}

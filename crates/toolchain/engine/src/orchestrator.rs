//! Orchestration of install, upgrade and uninstall passes
//!
//! Install and upgrade walk the registry in order, one component at a time,
//! and stop at the first error; the rollback controller then compensates
//! the failed batch. Uninstall tears every component down concurrently and
//! deletes the namespace once all teardown tasks have finished.

use crate::config::UninstallConfig;
use crate::error::{EngineError, Result};
use crate::report::{BatchReport, UninstallReport};
use crate::rollback::RollbackController;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use toolchain_components::{ComponentRegistry, Dispatcher, LifecycleOp};
use toolchain_state::{status_key, StateStore};
use toolchain_types::{ChangeId, ComponentStatus, ToolchainId};
use tracing::{debug, error, info, instrument, warn};

/// A sequential change batch.
#[derive(Debug, Clone, Copy)]
enum Batch {
    Install,
    Upgrade,
}

impl Batch {
    fn operation(self) -> LifecycleOp {
        match self {
            Self::Install => LifecycleOp::Install,
            Self::Upgrade => LifecycleOp::Upgrade,
        }
    }

    /// Install touches only fresh components, upgrade only applied ones.
    fn applies_to(self, status: ComponentStatus) -> bool {
        match self {
            Self::Install => status.is_unset(),
            Self::Upgrade => !status.is_unset(),
        }
    }

    fn target(self) -> ComponentStatus {
        match self {
            Self::Install => ComponentStatus::Installed,
            Self::Upgrade => ComponentStatus::Upgraded,
        }
    }
}

/// Drives lifecycle passes for one toolchain.
///
/// Holds no lock on the toolchain. Callers run at most one pass per
/// toolchain at a time.
pub struct Orchestrator {
    toolchain: ToolchainId,
    store: StateStore,
    dispatcher: Arc<dyn Dispatcher>,
    uninstall: UninstallConfig,
}

impl Orchestrator {
    pub fn new(
        toolchain: ToolchainId,
        store: StateStore,
        dispatcher: Arc<dyn Dispatcher>,
        uninstall: UninstallConfig,
    ) -> Self {
        Self {
            toolchain,
            store,
            dispatcher,
            uninstall,
        }
    }

    pub fn toolchain(&self) -> &ToolchainId {
        &self.toolchain
    }

    /// Install every component whose status is unset, in registry order.
    #[instrument(skip(self, registry), fields(toolchain = %self.toolchain))]
    pub async fn install(&self, registry: &ComponentRegistry) -> Result<BatchReport> {
        self.run_batch(registry, Batch::Install).await
    }

    /// Upgrade every component that was installed at least once.
    #[instrument(skip(self, registry), fields(toolchain = %self.toolchain))]
    pub async fn upgrade(&self, registry: &ComponentRegistry) -> Result<BatchReport> {
        self.run_batch(registry, Batch::Upgrade).await
    }

    /// Run a batch under a fresh change id; on failure compensate it and
    /// return [`EngineError::BatchAborted`].
    async fn run_batch(&self, registry: &ComponentRegistry, batch: Batch) -> Result<BatchReport> {
        let change_id = ChangeId::generate();
        let operation = batch.operation();
        let mut report = BatchReport::new(change_id.clone(), operation);

        info!(
            change_id = %change_id,
            operation = %operation,
            components = registry.len(),
            "Starting change batch"
        );

        match self.apply(registry, batch, &change_id, &mut report).await {
            Ok(()) => {
                info!(
                    change_id = %change_id,
                    applied = report.applied.len(),
                    skipped = report.skipped.len(),
                    "Change batch completed"
                );
                Ok(report.finish())
            }
            Err(cause) => {
                error!(
                    change_id = %change_id,
                    operation = %operation,
                    error = %cause,
                    "Change batch failed, compensating"
                );
                let rollback = RollbackController::new(
                    &self.toolchain,
                    &self.store,
                    self.dispatcher.as_ref(),
                )
                .compensate(registry, &change_id)
                .await;
                Err(EngineError::BatchAborted {
                    change_id,
                    operation,
                    cause: Box::new(cause),
                    rollback,
                })
            }
        }
    }

    async fn apply(
        &self,
        registry: &ComponentRegistry,
        batch: Batch,
        change_id: &ChangeId,
        report: &mut BatchReport,
    ) -> Result<()> {
        let operation = batch.operation();
        let namespace = self.toolchain.namespace();

        for entry in registry {
            let name = entry.name();
            let status = self.store.component_status(&self.toolchain, name).await?;
            if !batch.applies_to(status) {
                debug!(component = name, status = %status, "Skipping component");
                report.skipped.push(name.to_string());
                continue;
            }

            entry
                .component()
                .apply(operation, self.dispatcher.as_ref(), namespace)
                .await
                .map_err(|e| EngineError::adapter(name, operation, e))?;
            self.store
                .record_transition(&self.toolchain, name, batch.target(), change_id)
                .await?;

            info!(component = name, operation = %operation, "Component applied");
            report.applied.push(name.to_string());
        }
        Ok(())
    }

    /// Tear down every applied component concurrently, then delete the
    /// namespace.
    ///
    /// A failing or panicking teardown task is logged and listed in the
    /// report; its siblings run to completion regardless. Status entries
    /// are left untouched since the namespace delete destroys them.
    #[instrument(skip(self, registry), fields(toolchain = %self.toolchain))]
    pub async fn uninstall(&self, registry: &ComponentRegistry) -> Result<UninstallReport> {
        let permits = Arc::new(Semaphore::new(
            self.uninstall.max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        ));
        let namespace: Arc<str> = Arc::from(self.toolchain.namespace());

        let (names, tasks): (Vec<String>, Vec<_>) = registry
            .iter()
            .map(|entry| {
                let name = entry.name().to_string();
                let component = entry.component().clone();
                let store = self.store.clone();
                let toolchain = self.toolchain.clone();
                let dispatcher = self.dispatcher.clone();
                let permits = permits.clone();
                let namespace = namespace.clone();
                let task_name = name.clone();

                let task = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|e| {
                        EngineError::Teardown {
                            component: task_name.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    let status = store.get_active(&toolchain, &status_key(&task_name)).await?;
                    if status.is_empty() {
                        return Ok(false);
                    }
                    component
                        .uninstall(dispatcher.as_ref(), &namespace)
                        .await
                        .map_err(|e| EngineError::adapter(&task_name, LifecycleOp::Uninstall, e))?;
                    Ok::<_, EngineError>(true)
                });
                (name, task)
            })
            .unzip();

        let mut report = UninstallReport::default();
        for (name, outcome) in names.into_iter().zip(join_all(tasks).await) {
            match outcome {
                Ok(Ok(true)) => report.uninstalled.push(name),
                Ok(Ok(false)) => report.skipped.push(name),
                Ok(Err(e)) => {
                    warn!(component = %name, error = %e, "Component teardown failed");
                    report.failed.push(name);
                }
                Err(e) => {
                    error!(component = %name, error = %e, "Component teardown task panicked");
                    report.failed.push(name);
                }
            }
        }

        self.dispatcher.delete_namespace().await?;
        info!(
            uninstalled = report.uninstalled.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Toolchain uninstalled"
        );
        Ok(report)
    }
}

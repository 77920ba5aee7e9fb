//! Fire-and-forget entry point
//!
//! Validation and setup happen before the call returns and surface as
//! errors. The lifecycle pass itself runs on a spawned task; its outcome
//! is visible only through active state and logs.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use tokio::task::JoinHandle;
use toolchain_components::secrets::ensure_storage_secret;
use toolchain_components::{
    standard, ComponentRegistry, Dispatcher, DispatcherFactory, IdentityProvider,
};
use toolchain_state::StateStore;
use toolchain_types::{DesiredConfig, ToolchainId, ToolchainKind};
use tracing::{error, info, instrument};

/// Starts toolchain lifecycle passes in the background.
pub struct ToolchainService {
    config: EngineConfig,
    dispatchers: Arc<dyn DispatcherFactory>,
    identity: Arc<dyn IdentityProvider>,
}

impl ToolchainService {
    pub fn new(
        config: EngineConfig,
        dispatchers: Arc<dyn DispatcherFactory>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            dispatchers,
            identity,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Namespace-backed id of the toolchain called `name`.
    pub fn toolchain_id(&self, name: &str) -> ToolchainId {
        ToolchainId::from_name(&self.config.namespace_prefix, name)
    }

    /// Component set of `kind` for the given configuration.
    pub fn registry(
        &self,
        kind: ToolchainKind,
        desired: &DesiredConfig,
    ) -> Result<ComponentRegistry> {
        let registry = match kind {
            ToolchainKind::Standard => standard::registry(
                &desired.profile,
                &self.config.charts.catalog(),
                self.identity.clone(),
            )?,
        };
        Ok(registry)
    }

    /// Validate the profile, prepare the namespace and start an install.
    #[instrument(skip(self, profile))]
    pub async fn install_toolchain(
        &self,
        kind: &str,
        name: &str,
        profile: serde_json::Map<String, serde_json::Value>,
    ) -> Result<JoinHandle<()>> {
        let kind: ToolchainKind = kind.parse()?;
        let desired = DesiredConfig::from_profile_map(profile)?;
        let toolchain = self.toolchain_id(name);

        let dispatcher = self.dispatchers.connect(toolchain.namespace()).await?;
        dispatcher.create_namespace().await?;
        self.ensure_storage(dispatcher.as_ref(), &toolchain).await?;

        let store = StateStore::new(dispatcher.cluster());
        store.save_desired(&toolchain, &desired).await?;
        let registry = self.registry(kind, &desired)?;
        let orchestrator = self.orchestrator(toolchain, store, dispatcher);

        info!(toolchain = %orchestrator.toolchain(), "Toolchain install scheduled");
        Ok(tokio::spawn(async move {
            match orchestrator.install(&registry).await {
                Ok(report) => info!(
                    toolchain = %orchestrator.toolchain(),
                    change_id = %report.change_id,
                    "Toolchain installed"
                ),
                Err(e) => error!(
                    toolchain = %orchestrator.toolchain(),
                    error = %e,
                    "Toolchain install failed"
                ),
            }
        }))
    }

    /// Start an upgrade of an installed toolchain to its stored configuration.
    #[instrument(skip(self))]
    pub async fn upgrade_toolchain(&self, kind: &str, name: &str) -> Result<JoinHandle<()>> {
        let kind: ToolchainKind = kind.parse()?;
        let toolchain = self.toolchain_id(name);

        let dispatcher = self.dispatchers.connect(toolchain.namespace()).await?;
        dispatcher.create_namespace().await?;
        let store = StateStore::new(dispatcher.cluster());
        let desired: DesiredConfig = store.load_desired(&toolchain).await?;
        self.ensure_storage(dispatcher.as_ref(), &toolchain).await?;

        let registry = self.registry(kind, &desired)?;
        let orchestrator = self.orchestrator(toolchain, store, dispatcher);

        info!(toolchain = %orchestrator.toolchain(), "Toolchain upgrade scheduled");
        Ok(tokio::spawn(async move {
            match orchestrator.upgrade(&registry).await {
                Ok(report) => info!(
                    toolchain = %orchestrator.toolchain(),
                    change_id = %report.change_id,
                    "Toolchain upgraded"
                ),
                Err(e) => error!(
                    toolchain = %orchestrator.toolchain(),
                    error = %e,
                    "Toolchain upgrade failed"
                ),
            }
        }))
    }

    /// Start tearing a toolchain down, namespace included.
    #[instrument(skip(self))]
    pub async fn uninstall_toolchain(&self, kind: &str, name: &str) -> Result<JoinHandle<()>> {
        let kind: ToolchainKind = kind.parse()?;
        let toolchain = self.toolchain_id(name);

        let dispatcher = self.dispatchers.connect(toolchain.namespace()).await?;
        let store = StateStore::new(dispatcher.cluster());
        let desired: DesiredConfig = store.load_desired(&toolchain).await?;

        let registry = self.registry(kind, &desired)?;
        let orchestrator = self.orchestrator(toolchain, store, dispatcher);

        info!(toolchain = %orchestrator.toolchain(), "Toolchain uninstall scheduled");
        Ok(tokio::spawn(async move {
            match orchestrator.uninstall(&registry).await {
                Ok(report) if report.failed.is_empty() => {
                    info!(toolchain = %orchestrator.toolchain(), "Toolchain uninstalled")
                }
                Ok(report) => error!(
                    toolchain = %orchestrator.toolchain(),
                    failed = ?report.failed,
                    "Toolchain uninstalled with component failures"
                ),
                Err(e) => error!(
                    toolchain = %orchestrator.toolchain(),
                    error = %e,
                    "Toolchain uninstall failed"
                ),
            }
        }))
    }

    fn orchestrator(
        &self,
        toolchain: ToolchainId,
        store: StateStore,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Orchestrator {
        Orchestrator::new(toolchain, store, dispatcher, self.config.uninstall.clone())
    }

    async fn ensure_storage(
        &self,
        dispatcher: &dyn Dispatcher,
        toolchain: &ToolchainId,
    ) -> Result<()> {
        ensure_storage_secret(
            dispatcher.cluster().as_ref(),
            toolchain.namespace(),
            &self.config.storage.credentials(),
        )
        .await
        .map_err(EngineError::Setup)?;
        Ok(())
    }
}

//! Deployment dispatcher contract
//!
//! The dispatcher performs every concrete action against the deployment
//! target. It is bound to one namespace at connection time.

use crate::error::DispatchError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use toolchain_types::ClusterClient;

/// A chart release request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRelease {
    /// Release name
    pub name: String,
    /// Values passed to the chart, if any
    pub values: Option<Value>,
    /// Time allowed for the release to become ready
    pub timeout: Duration,
    /// Path of the chart archive
    pub chart_path: String,
}

impl ChartRelease {
    pub fn new(name: impl Into<String>, chart_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            values: None,
            timeout,
            chart_path: chart_path.into(),
        }
    }

    pub fn with_values(mut self, values: Value) -> Self {
        self.values = Some(values);
        self
    }
}

/// Namespace, chart and remote-command operations against a deployment target.
///
/// One dispatcher is shared by all concurrent teardown tasks of an
/// uninstall, so implementations must tolerate concurrent calls.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Namespace this dispatcher is bound to
    fn namespace(&self) -> &str;

    /// Handle on the cluster API of the target
    fn cluster(&self) -> Arc<dyn ClusterClient>;

    /// Create the namespace. Succeeds if it already exists.
    async fn create_namespace(&self) -> Result<(), DispatchError>;

    /// Delete the namespace and everything in it.
    async fn delete_namespace(&self) -> Result<(), DispatchError>;

    async fn install_chart(&self, release: &ChartRelease) -> Result<(), DispatchError>;

    async fn upgrade_chart(&self, release: &ChartRelease) -> Result<(), DispatchError>;

    /// Roll a release back to its previous revision.
    async fn rollback_release(&self, release: &ChartRelease) -> Result<(), DispatchError>;

    async fn uninstall_chart(&self, name: &str) -> Result<(), DispatchError>;

    /// Run a shell command inside a container of a pod.
    async fn exec_command(
        &self,
        pod: &str,
        container: &str,
        command: &str,
        namespace: &str,
    ) -> Result<(), DispatchError>;
}

/// Connects dispatchers bound to a namespace.
#[async_trait]
pub trait DispatcherFactory: Send + Sync {
    async fn connect(&self, namespace: &str) -> Result<Arc<dyn Dispatcher>, DispatchError>;
}

//! The component lifecycle contract

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Lifecycle operation of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    Install,
    Upgrade,
    Rollback,
    Uninstall,
}

impl LifecycleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Rollback => "rollback",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployable unit of a toolchain.
///
/// Every call may block on network I/O against the target; timeouts are
/// the component's own business.
#[async_trait]
pub trait Component: Send + Sync {
    /// Run pre-install tasks and install the component.
    async fn install(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()>;

    /// Upgrade an installed component.
    async fn upgrade(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()>;

    /// Return the component to the state it had before its last upgrade.
    async fn rollback(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()>;

    /// Remove the component.
    async fn uninstall(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()>;

    /// Dispatch a lifecycle operation by value.
    async fn apply(
        &self,
        op: LifecycleOp,
        dispatcher: &dyn Dispatcher,
        namespace: &str,
    ) -> Result<()> {
        match op {
            LifecycleOp::Install => self.install(dispatcher, namespace).await,
            LifecycleOp::Upgrade => self.upgrade(dispatcher, namespace).await,
            LifecycleOp::Rollback => self.rollback(dispatcher, namespace).await,
            LifecycleOp::Uninstall => self.uninstall(dispatcher, namespace).await,
        }
    }
}

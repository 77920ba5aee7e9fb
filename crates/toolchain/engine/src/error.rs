//! Engine error types

use crate::report::RollbackReport;
use thiserror::Error;
use toolchain_components::{ComponentError, DispatchError, LifecycleOp, RegistryError};
use toolchain_state::StateError;
use toolchain_types::{ChangeId, ValidationError};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Component {component} failed to {operation}: {source}")]
    Adapter {
        component: String,
        operation: LifecycleOp,
        #[source]
        source: ComponentError,
    },

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Toolchain setup failed: {0}")]
    Setup(#[source] ComponentError),

    #[error("Teardown task for {component} failed: {reason}")]
    Teardown { component: String, reason: String },

    #[error("Change batch {change_id} ({operation}) aborted: {cause}")]
    BatchAborted {
        change_id: ChangeId,
        operation: LifecycleOp,
        #[source]
        cause: Box<EngineError>,
        rollback: RollbackReport,
    },
}

impl EngineError {
    pub(crate) fn adapter(component: &str, operation: LifecycleOp, source: ComponentError) -> Self {
        Self::Adapter {
            component: component.to_string(),
            operation,
            source,
        }
    }

    /// The error that stopped a change batch, looking through
    /// [`BatchAborted`](Self::BatchAborted).
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::BatchAborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

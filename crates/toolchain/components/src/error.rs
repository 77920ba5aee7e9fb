//! Component and dispatcher error types

use thiserror::Error;
use toolchain_types::ClusterError;

/// Errors raised by a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Namespace {namespace} operation failed: {reason}")]
    Namespace { namespace: String, reason: String },

    #[error("Chart operation '{operation}' failed for release {release}: {reason}")]
    Chart {
        operation: &'static str,
        release: String,
        reason: String,
    },

    #[error("Command failed in {pod}/{container}: {reason}")]
    Exec {
        pod: String,
        container: String,
        reason: String,
    },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Errors raised by a component lifecycle call.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Required secret {name} is missing or incomplete")]
    MissingSecret { name: String },

    #[error("Identity provider error: {0}")]
    Identity(String),
}

impl From<reqwest::Error> for ComponentError {
    fn from(e: reqwest::Error) -> Self {
        ComponentError::Identity(e.to_string())
    }
}

/// Errors raised while building a registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Component {0} is already registered")]
    Duplicate(String),

    #[error("Invalid component name {0:?}")]
    InvalidName(String),
}

/// Result type for component operations
pub type Result<T> = std::result::Result<T, ComponentError>;

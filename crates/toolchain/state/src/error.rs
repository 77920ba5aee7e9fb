//! Error types for toolchain-state crate.

use thiserror::Error;
use toolchain_types::{ClusterError, ToolchainId};

/// Errors that can occur while reading or writing toolchain state.
#[derive(Debug, Error)]
pub enum StateError {
    /// The requested record does not exist.
    #[error("{record} not found for toolchain {toolchain}")]
    NotFound {
        toolchain: ToolchainId,
        record: &'static str,
    },

    /// A stored status is not one this engine writes.
    #[error("invalid status '{value}' stored under {key}")]
    InvalidStatus { key: String, value: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] ClusterError),
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

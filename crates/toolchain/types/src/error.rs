//! Validation errors raised before any component is touched.

use thiserror::Error;

/// Malformed desired configuration or request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required profile field is missing or empty.
    #[error("profile validation error: missing required field '{0}'")]
    MissingField(&'static str),

    /// The profile could not be decoded.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// The toolchain kind is not known.
    #[error("unknown toolchain kind: {0}")]
    UnknownKind(String),
}

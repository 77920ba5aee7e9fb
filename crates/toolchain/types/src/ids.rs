//! Strongly-typed identifiers for toolchain entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a toolchain instance.
///
/// The identifier is the cluster namespace the toolchain lives in; every
/// record the orchestrator persists is scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainId(String);

impl ToolchainId {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self(namespace.into())
    }

    /// Derive the namespace from a toolchain name, e.g. `ts-toolchain-dev`.
    pub fn from_name(prefix: &str, name: &str) -> Self {
        Self(format!("{prefix}{name}"))
    }

    pub fn namespace(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolchainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a change batch.
///
/// Stored verbatim in the `<component>.cid` active-state entry, so the
/// display form carries no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Rebuild an id read back from active state.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

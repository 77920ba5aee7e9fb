//! Desired configuration of a toolchain

use crate::error::ValidationError;
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of toolchain; selects the component set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    Standard,
}

impl ToolchainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
        }
    }
}

impl FromStr for ToolchainKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single target-configuration record of a toolchain.
///
/// Persisted as one opaque JSON document and replaced wholesale on save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
    pub profile: Profile,
}

impl DesiredConfig {
    /// Build a validated configuration from an untyped profile map.
    pub fn from_profile_map(
        profile: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        let profile: Profile = serde_json::from_value(serde_json::Value::Object(profile))
            .map_err(|e| ValidationError::InvalidProfile(e.to_string()))?;
        profile.validate()?;
        Ok(Self { profile })
    }
}

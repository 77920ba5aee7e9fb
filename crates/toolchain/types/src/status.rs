//! Component lifecycle status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle marker persisted under `<component>.status`.
///
/// Transitions: `Unset -> Installed -> Upgraded -> Reverted -> Upgraded -> ...`.
/// `Reverted` is only written by the rollback controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Never touched. Stored as the empty string.
    #[default]
    Unset,
    Installed,
    Upgraded,
    Reverted,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Installed => "installed",
            Self::Upgraded => "upgraded",
            Self::Reverted => "reverted",
        }
    }

    /// Parse a stored value. Returns `None` for strings this engine never writes.
    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "" => Some(Self::Unset),
            "installed" => Some(Self::Installed),
            "upgraded" => Some(Self::Upgraded),
            "reverted" => Some(Self::Reverted),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_forms() {
        for status in [
            ComponentStatus::Unset,
            ComponentStatus::Installed,
            ComponentStatus::Upgraded,
            ComponentStatus::Reverted,
        ] {
            assert_eq!(ComponentStatus::from_stored(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_empty_string_is_unset() {
        assert_eq!(ComponentStatus::from_stored(""), Some(ComponentStatus::Unset));
        assert!(ComponentStatus::default().is_unset());
    }

    #[test]
    fn test_unknown_value_rejected() {
        assert_eq!(ComponentStatus::from_stored("deleted"), None);
        assert_eq!(ComponentStatus::from_stored("Installed"), None);
    }
}

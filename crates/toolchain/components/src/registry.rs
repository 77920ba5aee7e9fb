//! Ordered component registry
//!
//! Registration order is install order: a component must come after every
//! component its own pre-install step relies on.

use crate::component::Component;
use crate::error::RegistryError;
use std::fmt;
use std::sync::Arc;

/// A named component.
#[derive(Clone)]
pub struct RegisteredComponent {
    name: String,
    component: Arc<dyn Component>,
}

impl RegisteredComponent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }
}

impl fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The fixed, ordered component set of a toolchain.
#[derive(Clone, Default, Debug)]
pub struct ComponentRegistry {
    entries: Vec<RegisteredComponent>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component.
    ///
    /// Names key the component's active-state entries, so they must be
    /// unique, non-empty and free of `.`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            return Err(RegistryError::InvalidName(name));
        }
        if self.get(&name).is_some() {
            return Err(RegistryError::Duplicate(name));
        }
        self.entries.push(RegisteredComponent { name, component });
        Ok(self)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<Self, RegistryError> {
        self.register(name, component)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredComponent> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredComponent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ComponentRegistry {
    type Item = &'a RegisteredComponent;
    type IntoIter = std::slice::Iter<'a, RegisteredComponent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedComponent;

    #[test]
    fn test_registration_order_is_kept() {
        let registry = ComponentRegistry::new()
            .with("docker", ScriptedComponent::new("docker"))
            .and_then(|r| r.with("authentik", ScriptedComponent::new("authentik")))
            .and_then(|r| r.with("loki", ScriptedComponent::new("loki")))
            .unwrap();

        assert_eq!(registry.names(), vec!["docker", "authentik", "loki"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.get("loki").is_some());
        assert!(registry.get("temporal").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ComponentRegistry::new();
        registry
            .register("loki", ScriptedComponent::new("loki"))
            .unwrap();
        let err = registry
            .register("loki", ScriptedComponent::new("loki"))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("loki".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = ComponentRegistry::new();
        assert!(matches!(
            registry.register("", ScriptedComponent::new("x")),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register("a.status", ScriptedComponent::new("x")),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(registry.is_empty());
    }
}

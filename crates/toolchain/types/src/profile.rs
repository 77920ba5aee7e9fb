//! Deployment profile shared by every standard component

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Host name of the identity provider below the profile domain.
const IDENTITY_PROVIDER_HOST: &str = "authentik";

/// Public addressing of a toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Base domain, e.g. `local.gd`. Components are exposed as `<component>.<domain>`.
    #[serde(default)]
    pub domain: String,

    /// Public port of the ingress.
    #[serde(default)]
    pub port: u16,

    /// Serve over plain http.
    #[serde(default)]
    pub insecure: bool,
}

impl Profile {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.domain.trim().is_empty() {
            return Err(ValidationError::MissingField("domain"));
        }
        Ok(())
    }

    pub fn url_scheme(&self) -> &'static str {
        if self.insecure {
            "http"
        } else {
            "https"
        }
    }

    /// Public host of a component, e.g. `grafana.local.gd`.
    pub fn host(&self, component: &str) -> String {
        format!("{}.{}", component, self.domain)
    }

    /// Root endpoint of the identity provider.
    pub fn oidc_endpoint(&self) -> String {
        format!(
            "{}://{}:{}/",
            self.url_scheme(),
            self.host(IDENTITY_PROVIDER_HOST),
            self.port
        )
    }

    /// OIDC discovery URL of the application registered for `service`.
    pub fn oidc_discovery_url(&self, service: &str) -> String {
        format!("{}application/o/{}/", self.oidc_endpoint(), service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert_eq!(
            Profile::default().validate(),
            Err(ValidationError::MissingField("domain"))
        );
        assert!(Profile::new("local.gd").validate().is_ok());
    }

    #[test]
    fn test_oidc_urls() {
        let mut profile = Profile::new("local.gd");
        profile.port = 8443;
        assert_eq!(profile.oidc_endpoint(), "https://authentik.local.gd:8443/");
        assert_eq!(
            profile.oidc_discovery_url("loki"),
            "https://authentik.local.gd:8443/application/o/loki/"
        );

        profile.insecure = true;
        assert_eq!(profile.oidc_endpoint(), "http://authentik.local.gd:8443/");
    }
}

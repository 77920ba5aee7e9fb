//! Identity provider integration
//!
//! Components that expose a web UI authenticate through the toolchain's
//! identity provider. The provider is bootstrapped once, after its own
//! install, and then hands out one OIDC client per dependent component.

use crate::charts::unique_id;
use crate::error::{ComponentError, Result};
use crate::secrets::{generate_password, secret_value};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toolchain_types::{ClusterClient, RecordData};
use tracing::{debug, info, instrument};

/// Secret holding the identity provider's bootstrap api token.
pub const BOOTSTRAP_SECRET: &str = "authentik-bootstrap";

/// Key of the api token inside [`BOOTSTRAP_SECRET`].
pub const API_TOKEN_KEY: &str = "api-token";

const AUTHORIZATION_FLOW: &str = "default-provider-authorization-explicit-consent";
const SIGNING_KEY_PAIR: &str = "authentik Self-signed Certificate";
const SCOPE_MAPPINGS: [&str; 3] = [
    "goauthentik.io/providers/oauth2/scope-email",
    "goauthentik.io/providers/oauth2/scope-openid",
    "goauthentik.io/providers/oauth2/scope-profile",
];

/// Credentials of a registered OIDC client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcClient {
    pub client_id: String,
    pub client_secret: String,
}

impl OidcClient {
    /// Secret data in the shape the charts mount it.
    pub fn to_secret_data(&self) -> RecordData {
        RecordData::from([
            ("client-id".to_string(), self.client_id.clone()),
            ("client-secret".to_string(), self.client_secret.clone()),
        ])
    }
}

/// Name of the secret holding a component's OIDC client.
pub fn oidc_client_secret_name(component: &str) -> String {
    format!("{component}-oidc-client")
}

/// The toolchain's identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Wait for the provider to come up and create the default user groups.
    async fn bootstrap(&self, cluster: &dyn ClusterClient, namespace: &str) -> Result<()>;

    /// Register an OIDC client and application for `component`.
    async fn register_client(
        &self,
        cluster: &dyn ClusterClient,
        component: &str,
        namespace: &str,
    ) -> Result<OidcClient>;
}

/// [`IdentityProvider`] backed by the authentik v3 api of the in-namespace
/// authentik release.
#[derive(Debug, Clone)]
pub struct AuthentikIdentityProvider {
    client: Client,
    base_url: Option<String>,
    health_interval: Duration,
    health_timeout: Duration,
}

impl AuthentikIdentityProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: None,
            health_interval: Duration::from_secs(2),
            health_timeout: Duration::from_secs(300),
        }
    }

    /// Talk to a fixed endpoint instead of the in-cluster service.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_health_check(mut self, interval: Duration, timeout: Duration) -> Self {
        self.health_interval = interval;
        self.health_timeout = timeout;
        self
    }

    /// In-cluster service address of the authentik release in `namespace`.
    pub fn service_url(&self, namespace: &str) -> String {
        match &self.base_url {
            Some(url) => url.clone(),
            None => format!(
                "http://authentik-{}.{}.svc.cluster.local",
                unique_id(namespace),
                namespace
            ),
        }
    }

    async fn connect(&self, cluster: &dyn ClusterClient, namespace: &str) -> Result<AuthentikApi> {
        let token = secret_value(cluster, namespace, BOOTSTRAP_SECRET, API_TOKEN_KEY).await?;
        let base_url = self.service_url(namespace);
        self.wait_healthy(&base_url).await?;
        Ok(AuthentikApi {
            client: self.client.clone(),
            base_url,
            token,
        })
    }

    /// Poll the service until it answers at all.
    async fn wait_healthy(&self, base_url: &str) -> Result<()> {
        let poll = async {
            loop {
                tokio::time::sleep(self.health_interval).await;
                match self.client.get(base_url).send().await {
                    Ok(_) => break,
                    Err(e) => debug!(url = base_url, error = %e, "Identity provider not ready"),
                }
            }
        };
        tokio::time::timeout(self.health_timeout, poll)
            .await
            .map_err(|_| ComponentError::Identity("service health check timeout".into()))
    }
}

impl Default for AuthentikIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for AuthentikIdentityProvider {
    #[instrument(skip(self, cluster))]
    async fn bootstrap(&self, cluster: &dyn ClusterClient, namespace: &str) -> Result<()> {
        let api = self.connect(cluster, namespace).await?;
        for group in default_groups() {
            let existing: Page<IgnoredAny> = api
                .get("core/groups", Some(&[("name", group.name)]))
                .await?;
            if !existing.results.is_empty() {
                continue;
            }
            let _: serde_json::Value = api.post("core/groups", &group).await?;
            info!(group = group.name, "Identity group created");
        }
        Ok(())
    }

    #[instrument(skip(self, cluster))]
    async fn register_client(
        &self,
        cluster: &dyn ClusterClient,
        component: &str,
        namespace: &str,
    ) -> Result<OidcClient> {
        let api = self.connect(cluster, namespace).await?;

        let mappings: Page<PropertyMapping> = api.get("propertymappings/all", None).await?;
        let property_mappings = scope_mapping_ids(&mappings.results);

        let key_pairs: Page<KeyPair> = api.get("crypto/certificatekeypairs", None).await?;
        let signing_key = key_pairs
            .results
            .into_iter()
            .find(|k| k.name == SIGNING_KEY_PAIR)
            .map(|k| k.pk)
            .ok_or_else(|| ComponentError::Identity("certificate keypair not found".into()))?;

        let flows: Page<Flow> = api.get("flows/instances", None).await?;
        let authorization_flow = flows
            .results
            .into_iter()
            .find(|f| f.slug == AUTHORIZATION_FLOW)
            .map(|f| f.pk)
            .ok_or_else(|| ComponentError::Identity("authorization flow not found".into()))?;

        let client = OidcClient {
            client_id: generate_password(40),
            client_secret: generate_password(128),
        };
        let provider: Created = api
            .post(
                "providers/oauth2",
                &OAuth2Provider {
                    name: component,
                    authorization_flow: &authorization_flow,
                    client_type: "confidential",
                    client_id: &client.client_id,
                    client_secret: &client.client_secret,
                    property_mappings,
                    signing_key: &signing_key,
                },
            )
            .await?;

        let _: serde_json::Value = api
            .post(
                "core/applications",
                &serde_json::json!({
                    "name": component,
                    "slug": component,
                    "provider": provider.pk,
                }),
            )
            .await?;

        info!(component = component, "OIDC client registered");
        Ok(client)
    }
}

/// Authenticated session against the v3 api.
struct AuthentikApi {
    client: Client,
    base_url: String,
    token: String,
}

impl AuthentikApi {
    fn url(&self, resource: &str) -> String {
        format!("{}/api/v3/{}/", self.base_url, resource)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: Option<&[(&str, &str)]>,
    ) -> Result<T> {
        let mut request = self.client.get(self.url(resource)).bearer_auth(&self.token);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await?;
        Self::handle_response(resource, "get", response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        resource: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(resource))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::handle_response(resource, "post", response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        resource: &str,
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ComponentError::Identity(format!(
                "'{resource}' {method} error ({status}): {body}"
            )))
        }
    }
}

#[derive(Debug, Serialize)]
struct Group {
    name: &'static str,
    users: Vec<u32>,
    is_superuser: bool,
    parent: Option<u32>,
}

fn default_groups() -> [Group; 3] {
    [
        Group {
            name: "admins",
            users: vec![1],
            is_superuser: true,
            parent: None,
        },
        Group {
            name: "editors",
            users: Vec::new(),
            is_superuser: false,
            parent: None,
        },
        Group {
            name: "viewers",
            users: Vec::new(),
            is_superuser: false,
            parent: None,
        },
    ]
}

#[derive(Debug, Serialize)]
struct OAuth2Provider<'a> {
    name: &'a str,
    authorization_flow: &'a str,
    client_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    property_mappings: Vec<String>,
    signing_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PropertyMapping {
    pk: String,
    #[serde(default)]
    managed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Flow {
    pk: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct KeyPair {
    pk: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    pk: i64,
}

/// Ids of the email, openid and profile scope mappings, in that order.
fn scope_mapping_ids(mappings: &[PropertyMapping]) -> Vec<String> {
    SCOPE_MAPPINGS
        .iter()
        .filter_map(|scope| {
            mappings
                .iter()
                .find(|m| m.managed.as_deref() == Some(*scope))
                .map(|m| m.pk.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchain_types::InMemoryCluster;

    #[test]
    fn test_service_url_uses_namespace_id() {
        let provider = AuthentikIdentityProvider::new();
        let url = provider.service_url("ts-toolchain-dev");
        assert_eq!(
            url,
            format!(
                "http://authentik-{}.ts-toolchain-dev.svc.cluster.local",
                unique_id("ts-toolchain-dev")
            )
        );

        let fixed = AuthentikIdentityProvider::new().with_base_url("http://localhost:9000/");
        assert_eq!(fixed.service_url("any"), "http://localhost:9000");
    }

    #[test]
    fn test_scope_mapping_ids_in_scope_order() {
        let mappings = vec![
            PropertyMapping {
                pk: "p".into(),
                managed: Some("goauthentik.io/providers/oauth2/scope-profile".into()),
            },
            PropertyMapping {
                pk: "x".into(),
                managed: None,
            },
            PropertyMapping {
                pk: "e".into(),
                managed: Some("goauthentik.io/providers/oauth2/scope-email".into()),
            },
            PropertyMapping {
                pk: "o".into(),
                managed: Some("goauthentik.io/providers/oauth2/scope-openid".into()),
            },
        ];
        assert_eq!(scope_mapping_ids(&mappings), vec!["e", "o", "p"]);
    }

    #[test]
    fn test_default_groups() {
        let groups = default_groups();
        let names: Vec<_> = groups.iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["admins", "editors", "viewers"]);
        assert!(groups[0].is_superuser);

        let json = serde_json::to_value(&groups[1]).unwrap();
        assert_eq!(json["parent"], serde_json::Value::Null);
        assert_eq!(json["users"], serde_json::json!([]));
    }

    #[test]
    fn test_oidc_client_secret_data() {
        let client = OidcClient {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let data = client.to_secret_data();
        assert_eq!(data["client-id"], "id");
        assert_eq!(data["client-secret"], "secret");
        assert_eq!(oidc_client_secret_name("loki"), "loki-oidc-client");
    }

    #[tokio::test]
    async fn test_bootstrap_requires_api_token() {
        let cluster = InMemoryCluster::new();
        let provider = AuthentikIdentityProvider::new();
        let err = provider.bootstrap(&cluster, "ns").await.unwrap_err();
        assert!(matches!(err, ComponentError::MissingSecret { .. }));
    }

    mod api {
        use super::*;
        use crate::secrets::ensure_secret;
        use serde_json::json;
        use wiremock::matchers::{body_partial_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn cluster_with_token() -> InMemoryCluster {
            let cluster = InMemoryCluster::new();
            ensure_secret(
                &cluster,
                "ns",
                BOOTSTRAP_SECRET,
                RecordData::from([(API_TOKEN_KEY.to_string(), "token\n".to_string())]),
            )
            .await
            .unwrap();
            cluster
        }

        fn provider(server: &MockServer) -> AuthentikIdentityProvider {
            AuthentikIdentityProvider::new()
                .with_base_url(server.uri())
                .with_health_check(Duration::from_millis(5), Duration::from_secs(5))
        }

        fn page(results: serde_json::Value) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(json!({ "results": results }))
        }

        #[tokio::test]
        async fn test_bootstrap_creates_missing_groups() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v3/core/groups/"))
                .and(query_param("name", "admins"))
                .and(header("authorization", "Bearer token"))
                .respond_with(page(json!([{ "name": "admins" }])))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v3/core/groups/"))
                .respond_with(page(json!([])))
                .expect(2)
                .mount(&server)
                .await;
            for group in ["editors", "viewers"] {
                Mock::given(method("POST"))
                    .and(path("/api/v3/core/groups/"))
                    .and(body_partial_json(json!({ "name": group, "is_superuser": false })))
                    .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "pk": group })))
                    .expect(1)
                    .mount(&server)
                    .await;
            }
            Mock::given(method("POST"))
                .and(path("/api/v3/core/groups/"))
                .and(body_partial_json(json!({ "name": "admins" })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
                .expect(0)
                .mount(&server)
                .await;

            let cluster = cluster_with_token().await;
            provider(&server).bootstrap(&cluster, "ns").await.unwrap();
        }

        #[tokio::test]
        async fn test_register_client_creates_provider_and_application() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v3/propertymappings/all/"))
                .respond_with(page(json!([
                    { "pk": "p", "managed": "goauthentik.io/providers/oauth2/scope-profile" },
                    { "pk": "e", "managed": "goauthentik.io/providers/oauth2/scope-email" },
                    { "pk": "o", "managed": "goauthentik.io/providers/oauth2/scope-openid" },
                    { "pk": "x", "managed": null },
                ])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v3/crypto/certificatekeypairs/"))
                .respond_with(page(json!([
                    { "pk": "other", "name": "custom" },
                    { "pk": "kp", "name": SIGNING_KEY_PAIR },
                ])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v3/flows/instances/"))
                .respond_with(page(json!([{ "pk": "flow", "slug": AUTHORIZATION_FLOW }])))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/api/v3/providers/oauth2/"))
                .and(body_partial_json(json!({
                    "name": "loki",
                    "authorization_flow": "flow",
                    "client_type": "confidential",
                    "property_mappings": ["e", "o", "p"],
                    "signing_key": "kp",
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "pk": 7 })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/api/v3/core/applications/"))
                .and(body_partial_json(json!({
                    "name": "loki",
                    "slug": "loki",
                    "provider": 7,
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
                .expect(1)
                .mount(&server)
                .await;

            let cluster = cluster_with_token().await;
            let client = provider(&server)
                .register_client(&cluster, "loki", "ns")
                .await
                .unwrap();

            assert_eq!(client.client_id.len(), 40);
            assert_eq!(client.client_secret.len(), 128);
        }

        #[tokio::test]
        async fn test_register_client_requires_authorization_flow() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v3/propertymappings/all/"))
                .respond_with(page(json!([])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v3/crypto/certificatekeypairs/"))
                .respond_with(page(json!([{ "pk": "kp", "name": SIGNING_KEY_PAIR }])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v3/flows/instances/"))
                .respond_with(page(json!([{ "pk": "f", "slug": "default-authentication-flow" }])))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "pk": 1 })))
                .expect(0)
                .mount(&server)
                .await;

            let cluster = cluster_with_token().await;
            let err = provider(&server)
                .register_client(&cluster, "loki", "ns")
                .await
                .unwrap_err();

            assert!(err.to_string().contains("authorization flow not found"));
        }

        #[tokio::test]
        async fn test_api_error_carries_status_and_body() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v3/propertymappings/all/"))
                .respond_with(ResponseTemplate::new(403).set_body_string("token expired"))
                .mount(&server)
                .await;

            let cluster = cluster_with_token().await;
            let err = provider(&server)
                .register_client(&cluster, "loki", "ns")
                .await
                .unwrap_err();

            let message = err.to_string();
            assert!(matches!(err, ComponentError::Identity(_)));
            assert!(message.contains("'propertymappings/all' get error"));
            assert!(message.contains("403"));
            assert!(message.contains("token expired"));
        }

        #[tokio::test]
        async fn test_unreachable_service_times_out() {
            let cluster = cluster_with_token().await;
            let provider = AuthentikIdentityProvider::new()
                .with_base_url("http://127.0.0.1:1")
                .with_health_check(Duration::from_millis(5), Duration::from_millis(100));

            let err = provider.bootstrap(&cluster, "ns").await.unwrap_err();

            assert!(err.to_string().contains("service health check timeout"));
        }
    }
}

//! The standard toolchain
//!
//! Four components, registered in install order: the container runtime,
//! the identity provider, and the two services that register OIDC clients
//! against the identity provider during their own pre-install.

pub mod authentik;
pub mod docker;
pub mod loki;
pub mod temporal;

pub use authentik::Authentik;
pub use docker::Docker;
pub use loki::Loki;
pub use temporal::Temporal;

use crate::charts::ChartCatalog;
use crate::dispatcher::Dispatcher;
use crate::error::{RegistryError, Result};
use crate::identity::{oidc_client_secret_name, IdentityProvider};
use crate::registry::ComponentRegistry;
use crate::secrets::{ensure_secret, STORAGE_SECRET};
use serde_json::{json, Value};
use std::sync::Arc;
use toolchain_types::Profile;
use tracing::debug;

/// Build the ordered component set of a standard toolchain.
pub fn registry(
    profile: &Profile,
    catalog: &ChartCatalog,
    identity: Arc<dyn IdentityProvider>,
) -> std::result::Result<ComponentRegistry, RegistryError> {
    ComponentRegistry::new()
        .with(
            docker::COMPONENT,
            Arc::new(Docker::new(catalog.clone())),
        )?
        .with(
            authentik::COMPONENT,
            Arc::new(Authentik::new(
                profile.clone(),
                catalog.clone(),
                identity.clone(),
            )),
        )?
        .with(
            loki::COMPONENT,
            Arc::new(Loki::new(profile.clone(), catalog.clone(), identity.clone())),
        )?
        .with(
            temporal::COMPONENT,
            Arc::new(Temporal::new(profile.clone(), catalog.clone(), identity)),
        )
}

/// Database or data-directory snapshot of a stateful pod, shipped to the
/// backup object store by a restic sidecar.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DataBackup {
    pub pod: &'static str,
    pub container: &'static str,
    /// File name below `/tmp/backup`
    pub archive: &'static str,
    /// Writes `/tmp/backup/<archive>` inside `container`
    pub dump: &'static str,
    /// Loads the restored archive inside `container`
    pub load: &'static str,
}

const RESTIC_CONTAINER: &str = "restic";

impl DataBackup {
    pub fn backup_command(&self) -> String {
        format!(
            r#"restic check; if [ "$?" == "1" ]; then restic init; fi; restic backup /tmp/backup/{}"#,
            self.archive
        )
    }

    pub fn restore_command(&self) -> String {
        format!(
            "restic restore latest --target /tmp/restore --include /tmp/backup/{}",
            self.archive
        )
    }

    pub async fn backup(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        dispatcher
            .exec_command(self.pod, self.container, self.dump, namespace)
            .await?;
        dispatcher
            .exec_command(self.pod, RESTIC_CONTAINER, &self.backup_command(), namespace)
            .await?;
        debug!(pod = self.pod, archive = self.archive, "Backup written");
        Ok(())
    }

    pub async fn restore(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        dispatcher
            .exec_command(self.pod, RESTIC_CONTAINER, &self.restore_command(), namespace)
            .await?;
        dispatcher
            .exec_command(self.pod, self.container, self.load, namespace)
            .await?;
        debug!(pod = self.pod, archive = self.archive, "Backup restored");
        Ok(())
    }
}

/// Register an OIDC client for `component` unless its secret already exists.
pub(crate) async fn ensure_oidc_client(
    identity: &dyn IdentityProvider,
    dispatcher: &dyn Dispatcher,
    component: &str,
    namespace: &str,
) -> Result<()> {
    let cluster = dispatcher.cluster();
    let secret = oidc_client_secret_name(component);
    if cluster.get_secret(namespace, &secret).await?.is_some() {
        return Ok(());
    }
    let client = identity
        .register_client(cluster.as_ref(), component, namespace)
        .await?;
    ensure_secret(cluster.as_ref(), namespace, &secret, client.to_secret_data()).await?;
    Ok(())
}

fn secret_env(name: &str, secret: &str, key: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": { "secretKeyRef": { "name": secret, "key": key } },
    })
}

/// Restic sidecar container reading its repository from the storage secret.
pub(crate) fn restic_sidecar() -> Value {
    json!({
        "name": RESTIC_CONTAINER,
        "image": "restic/restic",
        "command": ["/bin/sh"],
        "args": ["-c", "sleep infinity"],
        "env": [
            secret_env("RESTIC_REPOSITORY", STORAGE_SECRET, "url"),
            secret_env("RESTIC_PASSWORD", STORAGE_SECRET, "password"),
            secret_env("AWS_ACCESS_KEY_ID", STORAGE_SECRET, "access-key-id"),
            secret_env("AWS_SECRET_ACCESS_KEY", STORAGE_SECRET, "secret-access-key"),
        ],
        "volumeMounts": backup_volume_mounts(),
    })
}

pub(crate) fn backup_volumes() -> Value {
    json!([
        { "name": "backup", "emptyDir": { "sizeLimit": "1Gi" } },
        { "name": "restore", "emptyDir": { "sizeLimit": "1Gi" } },
    ])
}

pub(crate) fn backup_volume_mounts() -> Value {
    json!([
        { "name": "backup", "mountPath": "/tmp/backup" },
        { "name": "restore", "mountPath": "/tmp/restore" },
    ])
}

/// Annotations and tls entries for an ingress served over https.
pub(crate) fn secure_ingress(profile: &Profile, component: &str) -> Option<(Value, Value)> {
    if profile.insecure {
        return None;
    }
    Some((
        json!({
            "cert-manager.io/cluster-issuer": "ts-system",
            "kubernetes.io/ingress.class": "ts-system",
        }),
        json!([{
            "hosts": [profile.host(component)],
            "secretName": format!("{component}-ingress-tls-cert"),
        }]),
    ))
}

/// Local reverse proxy that makes the identity provider reachable under its
/// public host name from inside the pod when serving over plain http.
pub(crate) fn oidc_auth_proxy(profile: &Profile, namespace: &str) -> Value {
    json!({
        "name": "oidc-auth-proxy",
        "image": "quay.io/trustacks/local-gd-proxy",
        "env": [
            { "name": "UPSTREAM", "value": format!("authentik-{}", crate::charts::unique_id(namespace)) },
            { "name": "LISTEN_PORT", "value": profile.port.to_string() },
            { "name": "SERVICE", "value": "authentik" },
        ],
    })
}

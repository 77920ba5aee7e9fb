//! Namespaced secret helpers

use crate::error::{ComponentError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use toolchain_types::{ClusterClient, ClusterError, RecordData};
use tracing::debug;

/// Secret holding the backup object-store credentials.
pub const STORAGE_SECRET: &str = "ts-storage-config";

/// Random alphanumeric password.
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Create a secret unless one with that name already exists.
///
/// Returns `true` when the secret was created.
pub async fn ensure_secret(
    cluster: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    data: RecordData,
) -> Result<bool> {
    if cluster.get_secret(namespace, name).await?.is_some() {
        return Ok(false);
    }
    match cluster.create_secret(namespace, name, data).await {
        Ok(()) => {
            debug!(namespace = namespace, secret = name, "Secret created");
            Ok(true)
        }
        Err(ClusterError::AlreadyExists { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read one value from a secret.
pub async fn secret_value(
    cluster: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<String> {
    cluster
        .get_secret(namespace, name)
        .await?
        .and_then(|mut secret| secret.remove(key))
        .map(|value| value.trim().to_string())
        .ok_or_else(|| ComponentError::MissingSecret {
            name: format!("{name}/{key}"),
        })
}

/// Backup object-store credentials shared by the component backup sidecars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCredentials {
    pub url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Write the storage secret with a fresh repository password, once.
pub async fn ensure_storage_secret(
    cluster: &dyn ClusterClient,
    namespace: &str,
    credentials: &StorageCredentials,
) -> Result<bool> {
    let data = RecordData::from([
        ("url".to_string(), credentials.url.clone()),
        ("password".to_string(), generate_password(32)),
        ("access-key-id".to_string(), credentials.access_key_id.clone()),
        (
            "secret-access-key".to_string(),
            credentials.secret_access_key.clone(),
        ),
    ]);
    ensure_secret(cluster, namespace, STORAGE_SECRET, data).await
}

//! Identity provider component

use super::{backup_volume_mounts, backup_volumes, restic_sidecar, secure_ingress, DataBackup};
use crate::charts::{unique_id, ChartCatalog, ChartSource};
use crate::component::Component;
use crate::dispatcher::{ChartRelease, Dispatcher};
use crate::error::Result;
use crate::identity::{IdentityProvider, API_TOKEN_KEY, BOOTSTRAP_SECRET};
use crate::secrets::{ensure_secret, generate_password};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use toolchain_types::{Profile, RecordData};
use tracing::info;

pub const COMPONENT: &str = "authentik";

/// Secret holding the identity provider's database passwords.
pub const POSTGRESQL_SECRET: &str = "authentik-postgresql";

const CHART: ChartSource = ChartSource::new(COMPONENT, "2022.11.0");

const DATABASE: DataBackup = DataBackup {
    pod: "authentik-postgresql-0",
    container: "authentik-postgresql",
    archive: "authentik-postgresql",
    dump: "PGPASSWORD=$POSTGRES_PASSWORD pg_dump -U $POSTGRES_USER -F c -b -v -f /tmp/backup/authentik-postgresql $POSTGRES_DB",
    load: "PGPASSWORD=$POSTGRES_PASSWORD pg_restore -U $POSTGRES_USER /tmp/restore/tmp/backup/authentik-postgresql",
};

/// authentik, the toolchain's single sign-on provider.
pub struct Authentik {
    profile: Profile,
    catalog: ChartCatalog,
    identity: Arc<dyn IdentityProvider>,
}

impl Authentik {
    pub fn new(
        profile: Profile,
        catalog: ChartCatalog,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            profile,
            catalog,
            identity,
        }
    }

    /// Chart values for `namespace`.
    pub fn values(&self, namespace: &str) -> Value {
        let host = self.profile.host(COMPONENT);
        let mut ingress = json!({
            "enabled": true,
            "hosts": [{ "host": host, "paths": [{ "path": "/", "pathType": "Prefix" }] }],
        });
        if let Some((annotations, tls)) = secure_ingress(&self.profile, COMPONENT) {
            ingress["annotations"] = annotations;
            ingress["tls"] = tls;
        }

        json!({
            COMPONENT: {
                "fullnameOverride": format!("authentik-{}", unique_id(namespace)),
                "authentik": {
                    "secret_key": generate_password(32),
                    "postgresql": { "host": POSTGRESQL_SECRET },
                },
                "ingress": ingress,
                "postgresql": {
                    "enabled": true,
                    "existingSecret": POSTGRESQL_SECRET,
                    "primary": {
                        "sidecars": [restic_sidecar()],
                        "extraVolumes": backup_volumes(),
                        "extraVolumeMounts": backup_volume_mounts(),
                    },
                },
                "redis": { "enabled": true },
                "envValueFrom": {
                    "AUTHENTIK_BOOTSTRAP_TOKEN": {
                        "secretKeyRef": { "name": BOOTSTRAP_SECRET, "key": API_TOKEN_KEY },
                    },
                    "AUTHENTIK_POSTGRESQL__PASSWORD": {
                        "secretKeyRef": { "name": POSTGRESQL_SECRET, "key": "postgresql-postgres-password" },
                    },
                },
            }
        })
    }

    fn release(&self, namespace: &str) -> ChartRelease {
        self.catalog.release(&CHART).with_values(self.values(namespace))
    }

    /// Create the bootstrap api token and the database password.
    async fn pre_install(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        let cluster = dispatcher.cluster();
        ensure_secret(
            cluster.as_ref(),
            namespace,
            BOOTSTRAP_SECRET,
            RecordData::from([(API_TOKEN_KEY.to_string(), generate_password(32))]),
        )
        .await?;

        let password = generate_password(32);
        ensure_secret(
            cluster.as_ref(),
            namespace,
            POSTGRESQL_SECRET,
            RecordData::from([
                ("postgresql-password".to_string(), password.clone()),
                ("postgresql-postgres-password".to_string(), password),
            ]),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Component for Authentik {
    async fn install(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        self.pre_install(dispatcher, namespace).await?;
        dispatcher.install_chart(&self.release(namespace)).await?;
        self.identity
            .bootstrap(dispatcher.cluster().as_ref(), namespace)
            .await?;
        info!(namespace = namespace, "Identity provider bootstrapped");
        Ok(())
    }

    async fn upgrade(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        DATABASE.backup(dispatcher, namespace).await?;
        dispatcher.upgrade_chart(&self.release(namespace)).await?;
        Ok(())
    }

    async fn rollback(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        dispatcher.rollback_release(&self.release(namespace)).await?;
        DATABASE.restore(dispatcher, namespace).await
    }

    async fn uninstall(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher.uninstall_chart(COMPONENT).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DispatchCall, RecordingDispatcher, StaticIdentityProvider};
    use std::time::Duration;
    use toolchain_types::{ClusterClient, InMemoryCluster};

    fn authentik(profile: Profile, identity: Arc<StaticIdentityProvider>) -> Authentik {
        Authentik::new(
            profile,
            ChartCatalog::new("/charts", Duration::from_secs(300)),
            identity,
        )
    }

    #[tokio::test]
    async fn test_install_creates_secrets_then_bootstraps() {
        let cluster = Arc::new(InMemoryCluster::new());
        let dispatcher = RecordingDispatcher::new("ns", cluster.clone());
        let identity = StaticIdentityProvider::new();
        let component = authentik(Profile::new("local.gd"), identity.clone());

        component.install(dispatcher.as_ref(), "ns").await.unwrap();

        assert_eq!(
            dispatcher.calls(),
            vec![DispatchCall::InstallChart("authentik".into())]
        );
        assert_eq!(identity.bootstrap_count(), 1);
        let token = cluster.get_secret("ns", BOOTSTRAP_SECRET).await.unwrap().unwrap();
        assert_eq!(token[API_TOKEN_KEY].len(), 32);
        let db = cluster.get_secret("ns", POSTGRESQL_SECRET).await.unwrap().unwrap();
        assert_eq!(db["postgresql-password"], db["postgresql-postgres-password"]);
    }

    #[tokio::test]
    async fn test_reinstall_keeps_api_token() {
        let cluster = Arc::new(InMemoryCluster::new());
        let dispatcher = RecordingDispatcher::new("ns", cluster.clone());
        let component = authentik(Profile::new("local.gd"), StaticIdentityProvider::new());

        component.install(dispatcher.as_ref(), "ns").await.unwrap();
        let first = cluster.get_secret("ns", BOOTSTRAP_SECRET).await.unwrap();
        component.install(dispatcher.as_ref(), "ns").await.unwrap();
        assert_eq!(cluster.get_secret("ns", BOOTSTRAP_SECRET).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_upgrade_backs_up_first_and_rollback_restores_last() {
        let dispatcher = RecordingDispatcher::new("ns", Arc::new(InMemoryCluster::new()));
        let component = authentik(Profile::new("local.gd"), StaticIdentityProvider::new());

        component.upgrade(dispatcher.as_ref(), "ns").await.unwrap();
        component.rollback(dispatcher.as_ref(), "ns").await.unwrap();

        let exec = |container: &str| DispatchCall::Exec {
            pod: "authentik-postgresql-0".into(),
            container: container.into(),
        };
        assert_eq!(
            dispatcher.calls(),
            vec![
                exec("authentik-postgresql"),
                exec("restic"),
                DispatchCall::UpgradeChart("authentik".into()),
                DispatchCall::RollbackRelease("authentik".into()),
                exec("restic"),
                exec("authentik-postgresql"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_backup_skips_upgrade() {
        let dispatcher = RecordingDispatcher::new("ns", Arc::new(InMemoryCluster::new()));
        dispatcher.fail_on(DispatchCall::Exec {
            pod: "authentik-postgresql-0".into(),
            container: "restic".into(),
        });
        let component = authentik(Profile::new("local.gd"), StaticIdentityProvider::new());

        assert!(component.upgrade(dispatcher.as_ref(), "ns").await.is_err());
        assert!(!dispatcher
            .calls()
            .contains(&DispatchCall::UpgradeChart("authentik".into())));
    }

    #[test]
    fn test_values_follow_profile() {
        let component = authentik(Profile::new("example.com"), StaticIdentityProvider::new());
        let values = component.values("ns");
        let v = &values["authentik"];
        assert_eq!(v["fullnameOverride"], format!("authentik-{}", unique_id("ns")));
        assert_eq!(v["ingress"]["hosts"][0]["host"], "authentik.example.com");
        assert_eq!(v["ingress"]["tls"][0]["secretName"], "authentik-ingress-tls-cert");

        let mut insecure = Profile::new("local.gd");
        insecure.insecure = true;
        let values = authentik(insecure, StaticIdentityProvider::new()).values("ns");
        assert!(values["authentik"]["ingress"].get("tls").is_none());
    }
}

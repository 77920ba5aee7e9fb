//! Log store component, with grafana as its UI

use super::{
    backup_volume_mounts, backup_volumes, ensure_oidc_client, oidc_auth_proxy, restic_sidecar,
    secure_ingress, DataBackup,
};
use crate::charts::{ChartCatalog, ChartSource};
use crate::component::Component;
use crate::dispatcher::{ChartRelease, Dispatcher};
use crate::error::Result;
use crate::identity::{oidc_client_secret_name, IdentityProvider};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use toolchain_types::Profile;

pub const COMPONENT: &str = "loki";

const CHART: ChartSource = ChartSource::new(COMPONENT, "3.6.1");

const DATA: DataBackup = DataBackup {
    pod: "loki-0",
    container: "single-binary",
    archive: "loki-data",
    dump: "cd /tmp/backup && tar czf loki-data -C /var loki",
    load: "cd /tmp/restore && tar xf /tmp/restore/tmp/backup/loki-data && cp -R ./loki /var/loki",
};

const GRAFANA_ROLE_PATH: &str = "contains(groups[*], 'admins') && 'GrafanaAdmin' || contains(groups[*], 'editors') && 'Editor' || 'Viewer'";

pub struct Loki {
    profile: Profile,
    catalog: ChartCatalog,
    identity: Arc<dyn IdentityProvider>,
}

impl Loki {
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

    pub fn values(&self, namespace: &str) -> Value {
        let oidc = self.profile.oidc_endpoint();
        let grafana_host = self.profile.host("grafana");

        let mut grafana = json!({
            "grafana.ini": {
                "server": {
                    "domain": grafana_host,
                    "root_url": format!("{}://{}:{}", self.profile.url_scheme(), grafana_host, self.profile.port),
                },
                "auth.generic_oauth": {
                    "enabled": true,
                    "name": "SSO",
                    "scopes": "openid profile email",
                    "auth_url": format!("{oidc}application/o/authorize/"),
                    "token_url": format!("{oidc}application/o/token/"),
                    "api_url": format!("{oidc}application/o/userinfo/"),
                    "client_id": "$__file{/etc/secrets/auth_generic_oauth/client-id}",
                    "client_secret": "$__file{/etc/secrets/auth_generic_oauth/client-secret}",
                    "allow_assign_grafana_admin": true,
                    "role_attribute_path": GRAFANA_ROLE_PATH,
                },
            },
            "ingress": { "enabled": true, "hosts": [grafana_host] },
            "extraSecretMounts": [{
                "name": "oidc-client-credentials",
                "secretName": oidc_client_secret_name(COMPONENT),
                "mountPath": "/etc/secrets/auth_generic_oauth",
                "readOnly": true,
            }],
            "datasources": {
                "datasources.yaml": {
                    "apiVersion": 1,
                    "datasources": [{
                        "name": "Loki",
                        "type": "loki",
                        "access": "direct",
                        "url": "http://loki:3100",
                    }],
                },
            },
        });
        match secure_ingress(&self.profile, "grafana") {
            Some((annotations, tls)) => {
                grafana["ingress"]["annotations"] = annotations;
                grafana["ingress"]["tls"] = tls;
            }
            None => {
                grafana["extraContainers"] = json!([oidc_auth_proxy(&self.profile, namespace)]);
            }
        }

        json!({
            COMPONENT: {
                "loki": {
                    "commonConfig": { "replication_factor": 1 },
                    "storage": { "type": "filesystem" },
                    "auth_enabled": false,
                },
                "monitoring": {
                    "selfMonitoring": {
                        "enabled": false,
                        "grafanaAgent": { "installOperator": false },
                        "lokiCanary": { "enabled": false },
                    },
                    "serviceMonitor": { "enabled": false },
                },
                "test": { "enabled": false },
                "singleBinary": {
                    "extraContainers": [restic_sidecar()],
                    "extraVolumes": backup_volumes(),
                    "extraVolumeMounts": backup_volume_mounts(),
                },
                "grafana": grafana,
            }
        })
    }

    fn release(&self, namespace: &str) -> ChartRelease {
        self.catalog.release(&CHART).with_values(self.values(namespace))
    }
}

#[async_trait]
impl Component for Loki {
    async fn install(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        ensure_oidc_client(self.identity.as_ref(), dispatcher, COMPONENT, namespace).await?;
        dispatcher.install_chart(&self.release(namespace)).await?;
        Ok(())
    }

    async fn upgrade(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        DATA.backup(dispatcher, namespace).await?;
        dispatcher.upgrade_chart(&self.release(namespace)).await?;
        Ok(())
    }

    async fn rollback(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        dispatcher.rollback_release(&self.release(namespace)).await?;
        DATA.restore(dispatcher, namespace).await
    }

    async fn uninstall(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher.uninstall_chart(COMPONENT).await?;
        Ok(())
    }
}

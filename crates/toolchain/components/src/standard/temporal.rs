//! Workflow engine component

use super::{
    backup_volume_mounts, backup_volumes, ensure_oidc_client, oidc_auth_proxy, restic_sidecar,
    secure_ingress, DataBackup,
};
use crate::charts::{ChartCatalog, ChartSource};
use crate::component::Component;
use crate::dispatcher::{ChartRelease, Dispatcher};
use crate::error::Result;
use crate::identity::{oidc_client_secret_name, IdentityProvider};
use crate::secrets::{ensure_secret, generate_password, secret_value};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use toolchain_types::{JobSpec, Profile, RecordData};
use tracing::debug;

pub const COMPONENT: &str = "temporal";

/// Secret holding the workflow database passwords.
pub const MYSQL_SECRET: &str = "temporal-mysql";

/// Job that creates or migrates the workflow database schemas.
pub const SCHEMA_JOB: &str = "temporal-mysql-schema-update";

const CHART: ChartSource = ChartSource::new(COMPONENT, "0.19.0");
const APP_VERSION: &str = "1.19.0";

const DATABASE: DataBackup = DataBackup {
    pod: "temporal-mysql-0",
    container: "mysql",
    archive: "temporal-mysql",
    dump: "MYSQL_PWD=$MYSQL_ROOT_PASSWORD mysqldump -u root temporal > /tmp/backup/temporal-mysql",
    load: "MYSQL_PWD=$MYSQL_ROOT_PASSWORD mysql -u root temporal < /tmp/restore/tmp/backup/temporal-mysql",
};

// Waits for the database, then brings both schemas to the latest version.
const SCHEMA_SCRIPT: &str = r#"
while true; do
	curl $SQL_HOST:$SQL_PORT > /dev/null
	if [ "$?" == "1" ]; then
		temporal-sql-tool --db temporal setup-schema -v 0.0
		temporal-sql-tool --db temporal update-schema -d ./schema/mysql/v57/temporal/versioned
		temporal-sql-tool --db temporal_visibility setup-schema -v 0.0
		temporal-sql-tool --db temporal_visibility update-schema -d ./schema/mysql/v57/visibility/versioned
		break
	fi
	sleep 1
done
"#;

const INITDB_SCRIPT: &str = r#"
export MYSQL_PWD=$MYSQL_ROOT_PASSWORD
mysql -u root -e "create database temporal"
mysql -u root -e "grant all privileges on temporal.* to 'temporal'@'%'"
mysql -u root -e "create database temporal_visibility"
mysql -u root -e "grant all privileges on temporal_visibility.* to 'temporal'@'%'"
"#;

pub struct Temporal {
    profile: Profile,
    catalog: ChartCatalog,
    identity: Arc<dyn IdentityProvider>,
}

impl Temporal {
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
        let host = self.profile.host(COMPONENT);
        let client_secret = oidc_client_secret_name(COMPONENT);
        let sql = |database: &str| {
            json!({
                "driver": "sql",
                "sql": {
                    "database": database,
                    "user": "temporal",
                    "host": MYSQL_SECRET,
                    "existingSecret": MYSQL_SECRET,
                },
            })
        };

        let mut web = json!({
            "ingress": { "enabled": true, "hosts": [host] },
            "env": [
                { "name": "TEMPORAL_AUTH_ENABLED", "value": "true" },
                { "name": "TEMPORAL_AUTH_PROVIDER_URL", "value": self.profile.oidc_discovery_url(COMPONENT) },
                {
                    "name": "TEMPORAL_AUTH_CLIENT_ID",
                    "valueFrom": { "secretKeyRef": { "name": client_secret, "key": "client-id" } },
                },
                {
                    "name": "TEMPORAL_AUTH_CLIENT_SECRET",
                    "valueFrom": { "secretKeyRef": { "name": client_secret, "key": "client-secret" } },
                },
                {
                    "name": "TEMPORAL_AUTH_CALLBACK_URL",
                    "value": format!("{}://{}:{}/auth/sso/callback", self.profile.url_scheme(), host, self.profile.port),
                },
            ],
        });
        match secure_ingress(&self.profile, COMPONENT) {
            Some((annotations, tls)) => {
                web["ingress"]["annotations"] = annotations;
                web["ingress"]["tls"] = tls;
            }
            None => {
                web["sidecarContainers"] = json!([oidc_auth_proxy(&self.profile, namespace)]);
            }
        }

        json!({
            COMPONENT: {
                "server": {
                    "replicaCount": 1,
                    "config": {
                        "persistence": {
                            "default": sql("temporal"),
                            "visibility": sql("temporal_visibility"),
                        },
                    },
                },
                "web": web,
                "prometheus": { "enabled": false },
                "grafana": { "enabled": false },
                "elasticsearch": { "enabled": false },
                "cassandra": { "enabled": false },
                "mysql": {
                    "enabled": true,
                    "auth": { "username": "temporal", "existingSecret": MYSQL_SECRET },
                    "primary": {
                        "sidecars": [restic_sidecar()],
                        "extraVolumes": backup_volumes(),
                        "extraVolumeMounts": backup_volume_mounts(),
                    },
                    "initdbScripts": { "setup.sh": INITDB_SCRIPT },
                },
                "schema": {
                    "setup": { "enabled": false },
                    "update": { "enabled": false },
                },
            }
        })
    }

    fn release(&self, namespace: &str) -> ChartRelease {
        self.catalog.release(&CHART).with_values(self.values(namespace))
    }

    async fn ensure_mysql_secret(
        &self,
        dispatcher: &dyn Dispatcher,
        namespace: &str,
    ) -> Result<()> {
        let root_password = generate_password(32);
        let password = generate_password(32);
        ensure_secret(
            dispatcher.cluster().as_ref(),
            namespace,
            MYSQL_SECRET,
            RecordData::from([
                ("mysql-root-password".to_string(), root_password.clone()),
                ("mysql-replication-password".to_string(), root_password),
                ("mysql-password".to_string(), password.clone()),
                ("password".to_string(), password),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Schema setup and update job, authenticated as the `temporal` user.
    pub fn schema_job(password: &str) -> JobSpec {
        JobSpec {
            name: SCHEMA_JOB.to_string(),
            image: format!("temporalio/admin-tools:{APP_VERSION}"),
            command: vec!["/bin/sh".to_string()],
            args: vec!["-c".to_string(), SCHEMA_SCRIPT.to_string()],
            env: RecordData::from([
                ("SQL_PLUGIN".to_string(), "mysql".to_string()),
                ("SQL_HOST".to_string(), MYSQL_SECRET.to_string()),
                ("SQL_PORT".to_string(), "3306".to_string()),
                ("SQL_USER".to_string(), "temporal".to_string()),
                ("SQL_PASSWORD".to_string(), password.to_string()),
            ]),
            ttl_seconds_after_finished: Some(0),
        }
    }

    async fn update_schema(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        let cluster = dispatcher.cluster();
        let password = secret_value(cluster.as_ref(), namespace, MYSQL_SECRET, "password").await?;
        cluster.create_job(namespace, &Self::schema_job(&password)).await?;
        debug!(namespace = namespace, job = SCHEMA_JOB, "Schema job started");
        Ok(())
    }
}

#[async_trait]
impl Component for Temporal {
    async fn install(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        ensure_oidc_client(self.identity.as_ref(), dispatcher, COMPONENT, namespace).await?;
        self.ensure_mysql_secret(dispatcher, namespace).await?;
        self.update_schema(dispatcher, namespace).await?;
        dispatcher.install_chart(&self.release(namespace)).await?;
        Ok(())
    }

    async fn upgrade(&self, dispatcher: &dyn Dispatcher, namespace: &str) -> Result<()> {
        DATABASE.backup(dispatcher, namespace).await?;
        self.update_schema(dispatcher, namespace).await?;
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

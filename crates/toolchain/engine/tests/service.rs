//! End-to-end runs of the standard toolchain through the service entry point.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use toolchain_components::secrets::STORAGE_SECRET;
use toolchain_components::testing::{
    DispatchCall, RecordingDispatcherFactory, StaticIdentityProvider,
};
use toolchain_engine::{EngineConfig, EngineError, ToolchainService};
use toolchain_state::{StateError, StateStore};
use toolchain_types::{
    ClusterClient, ComponentStatus, DesiredConfig, InMemoryCluster, ValidationError,
};

const COMPONENTS: [&str; 4] = ["docker", "authentik", "loki", "temporal"];

struct Fixture {
    cluster: Arc<InMemoryCluster>,
    factory: Arc<RecordingDispatcherFactory>,
    identity: Arc<StaticIdentityProvider>,
    service: ToolchainService,
}

impl Fixture {
    fn new() -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let factory = RecordingDispatcherFactory::new(cluster.clone());
        let identity = StaticIdentityProvider::new();
        let service =
            ToolchainService::new(EngineConfig::default(), factory.clone(), identity.clone());
        Self {
            cluster,
            factory,
            identity,
            service,
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.cluster.clone())
    }
}

fn profile(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("test input is an object"),
    }
}

#[tokio::test]
async fn test_toolchain_namespace_uses_configured_prefix() {
    let f = Fixture::new();
    assert_eq!(f.service.toolchain_id("demo").namespace(), "ts-toolchain-demo");
}

#[tokio::test]
async fn test_install_rejects_profile_without_domain() {
    let f = Fixture::new();

    let err = f
        .service
        .install_toolchain("standard", "demo", profile(json!({"port": 443})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::MissingField("domain"))
    ));
    assert!(f.factory.dispatcher("ts-toolchain-demo").calls().is_empty());
}

#[tokio::test]
async fn test_install_rejects_unknown_kind() {
    let f = Fixture::new();

    let err = f
        .service
        .install_toolchain("exotic", "demo", profile(json!({"domain": "local.gd"})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::UnknownKind(_))
    ));
    assert!(f.factory.dispatcher("ts-toolchain-demo").calls().is_empty());
}

#[tokio::test]
async fn test_install_brings_up_standard_toolchain() {
    let f = Fixture::new();

    let handle = f
        .service
        .install_toolchain("standard", "demo", profile(json!({"domain": "local.gd"})))
        .await
        .unwrap();
    handle.await.unwrap();

    let toolchain = f.service.toolchain_id("demo");
    let store = f.store();
    for name in COMPONENTS {
        assert_eq!(
            store.component_status(&toolchain, name).await.unwrap(),
            ComponentStatus::Installed
        );
    }

    let desired: DesiredConfig = store.load_desired(&toolchain).await.unwrap();
    assert_eq!(desired.profile.domain, "local.gd");
    assert!(f
        .cluster
        .get_secret(toolchain.namespace(), STORAGE_SECRET)
        .await
        .unwrap()
        .is_some());

    let calls = f.factory.dispatcher(toolchain.namespace()).calls();
    assert_eq!(calls.first(), Some(&DispatchCall::CreateNamespace));
    let installs: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            DispatchCall::InstallChart(release) => Some(release.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(installs.len(), COMPONENTS.len());
    assert_eq!(f.identity.bootstrap_count(), 1);
}

#[tokio::test]
async fn test_upgrade_without_desired_state_fails() {
    let f = Fixture::new();

    let err = f.service.upgrade_toolchain("standard", "missing").await.unwrap_err();

    assert!(matches!(err, EngineError::State(StateError::NotFound { .. })));
}

#[tokio::test]
async fn test_upgrade_after_install_upgrades_every_component() {
    let f = Fixture::new();
    f.service
        .install_toolchain("standard", "demo", profile(json!({"domain": "local.gd"})))
        .await
        .unwrap()
        .await
        .unwrap();

    f.service
        .upgrade_toolchain("standard", "demo")
        .await
        .unwrap()
        .await
        .unwrap();

    let toolchain = f.service.toolchain_id("demo");
    let store = f.store();
    let upgrade_cid = store.component_change_id(&toolchain, "docker").await.unwrap();
    for name in COMPONENTS {
        assert_eq!(
            store.component_status(&toolchain, name).await.unwrap(),
            ComponentStatus::Upgraded
        );
    }
    // Every component of one pass carries the same change id.
    for name in COMPONENTS {
        assert_eq!(
            store.component_change_id(&toolchain, name).await.unwrap(),
            upgrade_cid
        );
    }
}

#[tokio::test]
async fn test_uninstall_removes_namespace() {
    let f = Fixture::new();
    f.service
        .install_toolchain("standard", "demo", profile(json!({"domain": "local.gd"})))
        .await
        .unwrap()
        .await
        .unwrap();
    let namespace = f.service.toolchain_id("demo").namespace().to_string();
    assert!(f.cluster.object_count(&namespace) > 0);

    f.service
        .uninstall_toolchain("standard", "demo")
        .await
        .unwrap()
        .await
        .unwrap();

    assert_eq!(f.cluster.object_count(&namespace), 0);
    let calls = f.factory.dispatcher(&namespace).calls();
    assert_eq!(calls.last(), Some(&DispatchCall::DeleteNamespace));
    let uninstalls = calls
        .iter()
        .filter(|c| matches!(c, DispatchCall::UninstallChart(_)))
        .count();
    assert_eq!(uninstalls, COMPONENTS.len());
}

#[tokio::test]
async fn test_unreachable_cluster_is_reported() {
    let f = Fixture::new();
    f.factory.refuse_connections();

    let err = f
        .service
        .install_toolchain("standard", "demo", profile(json!({"domain": "local.gd"})))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Dispatch(_)));
}

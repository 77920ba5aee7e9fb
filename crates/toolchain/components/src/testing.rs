//! Test doubles for the component contract
//!
//! Available to this crate's tests and, through the `test-utils` feature,
//! to the engine's tests.

use crate::component::{Component, LifecycleOp};
use crate::dispatcher::{ChartRelease, Dispatcher, DispatcherFactory};
use crate::error::{ComponentError, DispatchError, Result};
use crate::identity::{IdentityProvider, OidcClient};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use toolchain_types::{ClusterClient, InMemoryCluster};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One call observed by a [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchCall {
    CreateNamespace,
    DeleteNamespace,
    InstallChart(String),
    UpgradeChart(String),
    RollbackRelease(String),
    UninstallChart(String),
    Exec { pod: String, container: String },
}

/// Dispatcher that journals every call against an [`InMemoryCluster`].
///
/// Deleting the namespace purges it from the cluster, state records included.
pub struct RecordingDispatcher {
    namespace: String,
    cluster: Arc<InMemoryCluster>,
    calls: Mutex<Vec<DispatchCall>>,
    releases: Mutex<Vec<ChartRelease>>,
    commands: Mutex<Vec<String>>,
    failures: Mutex<HashSet<DispatchCall>>,
}

impl RecordingDispatcher {
    pub fn new(namespace: impl Into<String>, cluster: Arc<InMemoryCluster>) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            cluster,
            calls: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
        })
    }

    /// Make every future occurrence of `call` fail.
    pub fn fail_on(&self, call: DispatchCall) {
        lock(&self.failures).insert(call);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        lock(&self.calls).clone()
    }

    /// Chart releases passed to install, upgrade and rollback, in call order.
    pub fn releases(&self) -> Vec<ChartRelease> {
        lock(&self.releases).clone()
    }

    /// Commands passed to exec, in call order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn count(&self, call: &DispatchCall) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: DispatchCall) -> bool {
        let failing = lock(&self.failures).contains(&call);
        lock(&self.calls).push(call);
        failing
    }

    fn chart(
        &self,
        call: DispatchCall,
        operation: &'static str,
        release: &ChartRelease,
    ) -> std::result::Result<(), DispatchError> {
        lock(&self.releases).push(release.clone());
        if self.record(call) {
            return Err(DispatchError::Chart {
                operation,
                release: release.name.clone(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn cluster(&self) -> Arc<dyn ClusterClient> {
        self.cluster.clone()
    }

    async fn create_namespace(&self) -> std::result::Result<(), DispatchError> {
        if self.record(DispatchCall::CreateNamespace) {
            return Err(DispatchError::Namespace {
                namespace: self.namespace.clone(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    async fn delete_namespace(&self) -> std::result::Result<(), DispatchError> {
        if self.record(DispatchCall::DeleteNamespace) {
            return Err(DispatchError::Namespace {
                namespace: self.namespace.clone(),
                reason: "injected failure".into(),
            });
        }
        self.cluster.purge_namespace(&self.namespace);
        Ok(())
    }

    async fn install_chart(
        &self,
        release: &ChartRelease,
    ) -> std::result::Result<(), DispatchError> {
        self.chart(DispatchCall::InstallChart(release.name.clone()), "install", release)
    }

    async fn upgrade_chart(
        &self,
        release: &ChartRelease,
    ) -> std::result::Result<(), DispatchError> {
        self.chart(DispatchCall::UpgradeChart(release.name.clone()), "upgrade", release)
    }

    async fn rollback_release(
        &self,
        release: &ChartRelease,
    ) -> std::result::Result<(), DispatchError> {
        self.chart(
            DispatchCall::RollbackRelease(release.name.clone()),
            "rollback",
            release,
        )
    }

    async fn uninstall_chart(&self, name: &str) -> std::result::Result<(), DispatchError> {
        if self.record(DispatchCall::UninstallChart(name.to_string())) {
            return Err(DispatchError::Chart {
                operation: "uninstall",
                release: name.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    async fn exec_command(
        &self,
        pod: &str,
        container: &str,
        command: &str,
        _namespace: &str,
    ) -> std::result::Result<(), DispatchError> {
        lock(&self.commands).push(command.to_string());
        let call = DispatchCall::Exec {
            pod: pod.to_string(),
            container: container.to_string(),
        };
        if self.record(call) {
            return Err(DispatchError::Exec {
                pod: pod.to_string(),
                container: container.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

/// Hands out one [`RecordingDispatcher`] per namespace, all sharing a cluster.
pub struct RecordingDispatcherFactory {
    cluster: Arc<InMemoryCluster>,
    dispatchers: Mutex<HashMap<String, Arc<RecordingDispatcher>>>,
    refuse: AtomicBool,
}

impl RecordingDispatcherFactory {
    pub fn new(cluster: Arc<InMemoryCluster>) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            dispatchers: Mutex::new(HashMap::new()),
            refuse: AtomicBool::new(false),
        })
    }

    /// The dispatcher for `namespace`, created on first use.
    pub fn dispatcher(&self, namespace: &str) -> Arc<RecordingDispatcher> {
        lock(&self.dispatchers)
            .entry(namespace.to_string())
            .or_insert_with(|| RecordingDispatcher::new(namespace, self.cluster.clone()))
            .clone()
    }

    /// Fail every subsequent connection attempt.
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DispatcherFactory for RecordingDispatcherFactory {
    async fn connect(
        &self,
        namespace: &str,
    ) -> std::result::Result<Arc<dyn Dispatcher>, DispatchError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DispatchError::Connect(format!(
                "cluster unreachable for {namespace}"
            )));
        }
        Ok(self.dispatcher(namespace))
    }
}

/// Component whose behaviour is scripted per lifecycle operation.
///
/// Successful calls are forwarded to the dispatcher as chart operations on
/// a release named after the component, so the dispatcher journal shows
/// the global call order.
pub struct ScriptedComponent {
    name: String,
    calls: Mutex<Vec<LifecycleOp>>,
    failing: Mutex<HashSet<LifecycleOp>>,
    panicking: Mutex<HashSet<LifecycleOp>>,
    uninstall_delay: Mutex<Duration>,
    gauge: Mutex<Option<Arc<ConcurrencyGauge>>>,
}

impl ScriptedComponent {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            uninstall_delay: Mutex::new(Duration::ZERO),
            gauge: Mutex::new(None),
        })
    }

    pub fn fail_on(&self, op: LifecycleOp) {
        lock(&self.failing).insert(op);
    }

    pub fn succeed_on(&self, op: LifecycleOp) {
        lock(&self.failing).remove(&op);
    }

    pub fn panic_on(&self, op: LifecycleOp) {
        lock(&self.panicking).insert(op);
    }

    /// Hold each uninstall call open for `delay`.
    pub fn delay_uninstall(&self, delay: Duration) {
        *lock(&self.uninstall_delay) = delay;
    }

    pub fn calls(&self, op: LifecycleOp) -> usize {
        lock(&self.calls).iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Count overlapping uninstall calls in `gauge`.
    pub fn track_uninstalls(&self, gauge: Arc<ConcurrencyGauge>) {
        *lock(&self.gauge) = Some(gauge);
    }

    fn release(&self) -> ChartRelease {
        ChartRelease::new(self.name.clone(), format!("{}.tgz", self.name), Duration::ZERO)
    }

    async fn run(&self, op: LifecycleOp, dispatcher: &dyn Dispatcher) -> Result<()> {
        lock(&self.calls).push(op);
        if lock(&self.panicking).contains(&op) {
            panic!("{} panicked during {}", self.name, op);
        }
        if lock(&self.failing).contains(&op) {
            return Err(ComponentError::Dispatch(DispatchError::Chart {
                operation: op.as_str(),
                release: self.name.clone(),
                reason: "scripted failure".into(),
            }));
        }
        match op {
            LifecycleOp::Install => dispatcher.install_chart(&self.release()).await?,
            LifecycleOp::Upgrade => dispatcher.upgrade_chart(&self.release()).await?,
            LifecycleOp::Rollback => dispatcher.rollback_release(&self.release()).await?,
            LifecycleOp::Uninstall => {
                let delay = *lock(&self.uninstall_delay);
                let gauge = lock(&self.gauge).clone();
                if let Some(gauge) = &gauge {
                    gauge.enter();
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(gauge) = &gauge {
                    gauge.leave();
                }
                dispatcher.uninstall_chart(&self.name).await?
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Component for ScriptedComponent {
    async fn install(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        self.run(LifecycleOp::Install, dispatcher).await
    }

    async fn upgrade(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        self.run(LifecycleOp::Upgrade, dispatcher).await
    }

    async fn rollback(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        self.run(LifecycleOp::Rollback, dispatcher).await
    }

    async fn uninstall(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        self.run(LifecycleOp::Uninstall, dispatcher).await
    }
}

/// Tracks how many calls overlap.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest overlap seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Identity provider that answers immediately with fixed credentials.
#[derive(Default)]
pub struct StaticIdentityProvider {
    bootstraps: AtomicUsize,
    registered: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl StaticIdentityProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_registrations(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    /// Components that registered a client, in order.
    pub fn registered(&self) -> Vec<String> {
        lock(&self.registered).clone()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn bootstrap(&self, _cluster: &dyn ClusterClient, _namespace: &str) -> Result<()> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register_client(
        &self,
        _cluster: &dyn ClusterClient,
        component: &str,
        _namespace: &str,
    ) -> Result<OidcClient> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ComponentError::Identity(format!(
                "registration refused for {component}"
            )));
        }
        lock(&self.registered).push(component.to_string());
        Ok(OidcClient {
            client_id: format!("{component}-client"),
            client_secret: "secret".into(),
        })
    }
}

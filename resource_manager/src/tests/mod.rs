// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use process_manager::ProcessConfig;
use resource_name::{Api, Model, Name};
use robot_net::{DialOptions, ParentNotifier, RemoteConfig, RemoteConnection};
use task_executor::Executor;

use super::*;

struct InstrumentedResource {
    reconfigures: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Resource for InstrumentedResource {
    async fn reconfigure(&self, _deps: &Dependencies, _config: &ResourceConfig) -> ReconfigureOutcome {
        self.reconfigures.fetch_add(1, Ordering::SeqCst);
        ReconfigureOutcome::Reconfigured
    }

    async fn close(&self) -> Result<(), String> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl InstrumentedResource {
    fn fresh() -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (InstrumentedResource { reconfigures: Arc::new(AtomicUsize::new(0)), closed: closed.clone() }, closed)
    }
}

/// Builds resources while recording construction order and counts, so tests can assert on both
/// dependency ordering and the reconfigure-vs-rebuild decision without inspecting manager internals.
#[derive(Default)]
struct InstrumentedConstructor {
    builds: Arc<AtomicUsize>,
    reconfigures: Arc<AtomicUsize>,
    order: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ResourceConstructor for InstrumentedConstructor {
    async fn construct(&self, name: &Name, _config: &ResourceConfig, _deps: &Dependencies) -> Result<ResourceHandle, String> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.order.lock().push(name.local_name.clone());
        Ok(Arc::new(InstrumentedResource { reconfigures: self.reconfigures.clone(), closed: Arc::new(AtomicBool::new(false)) }))
    }
}

struct NullDialer;

#[async_trait]
impl RemoteDialer for NullDialer {
    async fn dial(&self, _options: &DialOptions) -> Result<Arc<dyn RemoteConnection>, String> {
        Err("no remotes configured in this test".to_owned())
    }
}

/// A remote whose resource set can be changed mid-test via [`FakeRemoteConnection::set_names`],
/// and whose parent-notifier can be fired via [`FakeRemoteConnection::wake`] to exercise the
/// manager's background reconciliation pass the same way a real remote's push notification would.
struct FakeRemoteConnection {
    names: Mutex<Vec<Name>>,
    notifier: Mutex<Option<ParentNotifier>>,
}

impl FakeRemoteConnection {
    fn new(names: Vec<Name>) -> Arc<Self> {
        Arc::new(FakeRemoteConnection { names: Mutex::new(names), notifier: Mutex::new(None) })
    }

    fn set_names(&self, names: Vec<Name>) {
        *self.names.lock() = names;
    }

    fn wake(&self) {
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.notify();
        }
    }
}

#[async_trait]
impl RemoteConnection for FakeRemoteConnection {
    async fn resource_names(&self) -> Result<Vec<Name>, String> {
        Ok(self.names.lock().clone())
    }

    async fn resource_rpc_apis(&self) -> Result<Vec<Api>, String> {
        Ok(Vec::new())
    }

    fn set_parent_notifier(&self, notifier: ParentNotifier) {
        *self.notifier.lock() = Some(notifier);
    }
}

struct FakeDialer {
    connections: Mutex<HashMap<String, Arc<FakeRemoteConnection>>>,
}

impl FakeDialer {
    fn new() -> Arc<Self> {
        Arc::new(FakeDialer { connections: Mutex::new(HashMap::new()) })
    }

    fn register(&self, address: &str, connection: Arc<FakeRemoteConnection>) {
        self.connections.lock().insert(address.to_owned(), connection);
    }
}

#[async_trait]
impl RemoteDialer for FakeDialer {
    async fn dial(&self, options: &DialOptions) -> Result<Arc<dyn RemoteConnection>, String> {
        self.connections
            .lock()
            .get(&options.address)
            .cloned()
            .map(|c| c as Arc<dyn RemoteConnection>)
            .ok_or_else(|| format!("no fake connection registered for `{}`", options.address))
    }
}

/// Builds a proxy resource for each remote-grafted name, keeping the `closed` flag of every
/// resource it has ever built so a test can assert that a resource lost from its remote was
/// actually closed, not merely unlinked from the graph.
#[derive(Default)]
struct FakeClientConstructor {
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

#[async_trait]
impl ClientConstructor for FakeClientConstructor {
    async fn construct_client(&self, _name: &Name, _remote: &Arc<dyn RemoteConnection>) -> Result<ResourceHandle, String> {
        let (resource, closed) = InstrumentedResource::fresh();
        self.closed_flags.lock().push(closed);
        Ok(Arc::new(resource))
    }
}

fn component(api: Api, local_name: &str, model: Model, depends_on: Vec<&str>) -> ResourceConfig {
    ResourceConfig::new(Name::new(api, local_name), model)
        .with_depends_on(depends_on.into_iter().map(str::to_owned).collect())
}

fn added(components: Vec<ResourceConfig>) -> ConfigDiff {
    let mut diff = ConfigDiff::default();
    diff.added.components = components;
    diff
}

fn widget_api() -> Api {
    Api::component("widget")
}

/// Waits a few scheduler turns for the manager's background remote-wake task to observe a
/// notification and finish its reconciliation pass, without assuming any fixed timing.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn linear_chain_builds_dependencies_before_dependents() {
    let _ = env_logger::try_init();
    let executor = Executor::new();
    let manager = ResourceManager::new(ManagerOptions::default(), NullDialer::arc(), &executor);
    let constructor = Arc::new(InstrumentedConstructor::default());
    manager.register_constructor(widget_api(), constructor.clone());

    let model = Model::builtin("widget");
    let diff = added(vec![
        component(widget_api(), "a", model.clone(), vec!["b"]),
        component(widget_api(), "b", model.clone(), vec!["c"]),
        component(widget_api(), "c", model, vec![]),
    ]);

    let report = manager.apply_diff(diff).await.unwrap();
    assert!(report.outcomes.iter().all(|(_, outcome)| matches!(outcome, ResourceOutcome::Built)));
    assert_eq!(*constructor.order.lock(), vec!["c".to_owned(), "b".to_owned(), "a".to_owned()]);

    assert!(manager.resource_by_name("a").is_ok());
    assert!(manager.resource_by_name("b").is_ok());
    assert!(manager.resource_by_name("c").is_ok());
}

#[tokio::test]
async fn model_change_rebuilds_instead_of_reconfiguring() {
    let executor = Executor::new();
    let manager = ResourceManager::new(ManagerOptions::default(), NullDialer::arc(), &executor);
    let constructor = Arc::new(InstrumentedConstructor::default());
    manager.register_constructor(widget_api(), constructor.clone());

    let m1 = Model::builtin("v1");
    let m2 = Model::builtin("v2");

    manager.apply_diff(added(vec![component(widget_api(), "a", m1, vec![])])).await.unwrap();
    assert_eq!(constructor.builds.load(Ordering::SeqCst), 1);
    assert_eq!(constructor.reconfigures.load(Ordering::SeqCst), 0);

    let mut diff = ConfigDiff::default();
    diff.modified.components = vec![component(widget_api(), "a", m2.clone(), vec![])];
    manager.apply_diff(diff).await.unwrap();

    assert_eq!(constructor.builds.load(Ordering::SeqCst), 2, "a model change must close and rebuild, not reconfigure");
    assert_eq!(constructor.reconfigures.load(Ordering::SeqCst), 0);

    // A second, no-op modification against the same model reconfigures in place instead.
    let mut diff = ConfigDiff::default();
    diff.modified.components = vec![component(widget_api(), "a", m2, vec![])];
    manager.apply_diff(diff).await.unwrap();

    assert_eq!(constructor.builds.load(Ordering::SeqCst), 2);
    assert_eq!(constructor.reconfigures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn untrusted_environment_rejects_shell_service_and_processes() {
    let executor = Executor::new();
    let options = ManagerOptions { untrusted_env: true, ..Default::default() };
    let manager = ResourceManager::new(options, NullDialer::arc(), &executor);

    let shell = component(Api::service("shell"), "sh", Model::builtin("shell"), vec![]);
    let err = manager.apply_diff(added(vec![shell])).await.unwrap_err();
    assert!(matches!(err, ManagerError::ShellServiceDisabled));

    let mut diff = ConfigDiff::default();
    diff.added.processes = vec![ProcessConfig::new("p1", "true")];
    let err = manager.apply_diff(diff).await.unwrap_err();
    assert!(matches!(err, ManagerError::ProcessesDisabled));
}

#[tokio::test]
async fn remote_resources_are_grafted_under_the_remote_node() {
    let executor = Executor::new();
    let dialer = FakeDialer::new();
    let connection = FakeRemoteConnection::new(vec![Name::new(Api::component("arm"), "a")]);
    dialer.register("r1.example.org", connection.clone());

    let manager = ResourceManager::new(ManagerOptions::default(), dialer, &executor);
    manager.register_client_constructor(Api::component("arm"), Arc::new(FakeClientConstructor::default()));

    let mut diff = ConfigDiff::default();
    diff.added.remotes = vec![RemoteConfig::new("r1", "r1.example.org")];
    manager.apply_diff(diff).await.unwrap();

    assert_eq!(manager.remote_names(), vec!["r1".to_owned()]);
    assert!(manager.resource_by_name("r1:a").is_ok());
    assert!(manager.resource_by_name("a").is_ok(), "an unambiguous short query should still resolve");

    let native_names: Vec<String> = manager.resource_names().iter().map(Name::qualified_string).collect();
    assert!(native_names.contains(&"r1:a".to_owned()));
    assert!(!native_names.iter().any(|n| n == "r1"), "the remote pseudo-node itself must not be listed");

    let grafted = Name::new(Api::component("arm"), "a").prepend_remote("r1");
    assert_eq!(manager.resource_model(&grafted), Some(Model::unknown()), "a remote-origin node's model is always unknown");
}

#[tokio::test]
async fn ambiguous_short_query_across_remotes_is_a_clash() {
    let executor = Executor::new();
    let dialer = FakeDialer::new();
    let conn1 = FakeRemoteConnection::new(vec![Name::new(Api::component("arm"), "a")]);
    let conn2 = FakeRemoteConnection::new(vec![Name::new(Api::component("arm"), "a")]);
    dialer.register("r1.example.org", conn1);
    dialer.register("r2.example.org", conn2);

    let manager = ResourceManager::new(ManagerOptions::default(), dialer, &executor);
    manager.register_client_constructor(Api::component("arm"), Arc::new(FakeClientConstructor::default()));

    let mut diff = ConfigDiff::default();
    diff.added.remotes =
        vec![RemoteConfig::new("r1", "r1.example.org"), RemoteConfig::new("r2", "r2.example.org")];
    manager.apply_diff(diff).await.unwrap();

    let err = manager.resource_by_name("arm:a").unwrap_err();
    match err {
        ManagerError::RemoteResourceClash { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("expected a clash, got {other:?}"),
    }

    assert!(manager.resource_by_name("r1:arm:a").is_ok());
    assert!(manager.resource_by_name("r2:arm:a").is_ok());
}

#[tokio::test]
async fn losing_a_remote_resource_removes_its_local_graft() {
    let _ = env_logger::try_init();
    let executor = Executor::new();
    let dialer = FakeDialer::new();
    let connection = FakeRemoteConnection::new(vec![Name::new(Api::component("arm"), "a")]);
    dialer.register("r1.example.org", connection.clone());

    let manager = ResourceManager::new(ManagerOptions::default(), dialer, &executor);
    let client_constructor = Arc::new(FakeClientConstructor::default());
    manager.register_client_constructor(Api::component("arm"), client_constructor.clone());

    let mut diff = ConfigDiff::default();
    diff.added.remotes = vec![RemoteConfig::new("r1", "r1.example.org")];
    manager.apply_diff(diff).await.unwrap();
    assert!(manager.resource_by_name("r1:a").is_ok());
    let closed_flags = client_constructor.closed_flags.lock().clone();
    assert_eq!(closed_flags.len(), 1);
    assert!(!closed_flags[0].load(Ordering::SeqCst));

    connection.set_names(vec![]);
    connection.wake();
    settle().await;

    assert!(manager.resource_by_name("r1:a").is_err(), "a resource gone from the remote must be swept locally");
    assert!(closed_flags[0].load(Ordering::SeqCst), "the removed resource's handle must be closed");

    let grafted = Name::new(Api::component("arm"), "a").prepend_remote("r1");
    assert_eq!(manager.resource_model(&grafted), None, "a swept node's tracked model must not linger");
}

impl NullDialer {
    fn arc() -> Arc<dyn RemoteDialer> {
        Arc::new(NullDialer)
    }
}

// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The resource manager itself: the orchestrator that turns a configuration diff into graph
//! mutations, runs the reverse-topological build/reconfigure sweep, dials remotes and keeps their
//! subtrees in sync, and answers queries about the live graph.

use std::sync::Arc;

use fnv::FnvHashMap as HashMap;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use graph::Graph;
use process_manager::ProcessManager;
use resource_name::{Api, Model, Name, Namespace, ResourceKind};
use robot_net::{ParentNotifier, RemoteConfig, RemoteConnection};
use task_executor::Executor;

use crate::appimage;
use crate::config::{ManagerOptions, ResourceConfig};
use crate::diff::ConfigDiff;
use crate::errors::{BuildError, ManagerError};
use crate::remote::{ClientConstructor, RemoteDialer, RemoteEntry};
use crate::resource::{Dependencies, ReconfigureOutcome, Resource, ResourceConstructor, ResourceHandle};

type ResourceGraph = Graph<Name, ResourceConfig, ResourceHandle, BuildError>;

/// A diff-application or remote-wake pass's per-node outcome, the richer counterpart to a bare
/// success/failure bit.
#[derive(Clone, Debug)]
pub enum ResourceOutcome {
    Built,
    Reconfigured,
    Rebuilt,
    Failed(BuildError),
    Closed,
}

/// Every per-name outcome of one pass, in the order the pass visited them.
#[derive(Clone, Debug, Default)]
pub struct ReconfigureReport {
    pub outcomes: Vec<(Name, ResourceOutcome)>,
}

impl ReconfigureReport {
    fn push(&mut self, name: Name, outcome: ResourceOutcome) {
        self.outcomes.push((name, outcome));
    }
}

/// Running counters, reset only by process restart; exposed for tests and diagnostics rather than
/// as an external metrics surface.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub built: u64,
    pub reconfigured: u64,
    pub rebuilt: u64,
    pub failed: u64,
    pub closed: u64,
}

fn is_shell_service(api: &Api) -> bool {
    api.namespace == Namespace::Rdk && api.kind == ResourceKind::Service && api.subtype == "shell"
}

fn is_internal_web_service(api: &Api) -> bool {
    api.namespace == Namespace::RdkInternal && api.kind == ResourceKind::Service && api.subtype == "web"
}

/// A resource handle standing in for a remote-node: it carries no behavior of its own, it exists
/// so the remote pseudo-node can be swapped/closed through the same `Entry` machinery as every
/// other node.
struct RemoteNodeResource;

#[async_trait::async_trait]
impl Resource for RemoteNodeResource {
    async fn reconfigure(&self, _deps: &Dependencies, _config: &ResourceConfig) -> ReconfigureOutcome {
        ReconfigureOutcome::Failed(
            "remote nodes are rebuilt by re-dialing, not reconfigured in place".to_owned(),
        )
    }

    async fn close(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Orchestrates a robot's live resource graph: the single owner of graph structural mutation,
/// serialized by `config_mutex` per the concurrency model's single-writer requirement.
pub struct ResourceManager {
    graph: ResourceGraph,
    process_manager: ProcessManager,
    options: ManagerOptions,
    dialer: Arc<dyn RemoteDialer>,
    constructors: RwLock<HashMap<Api, Arc<dyn ResourceConstructor>>>,
    client_constructors: RwLock<HashMap<Api, Arc<dyn ClientConstructor>>>,
    remotes: Mutex<HashMap<String, RemoteEntry>>,
    built_models: Mutex<HashMap<Name, Model>>,
    config_mutex: tokio::sync::Mutex<()>,
    cancellation: CancellationToken,
    stats: Mutex<Stats>,
    notifier: ParentNotifier,
}

impl ResourceManager {
    /// Builds a manager and starts its background remote-wake task on `executor`. The returned
    /// `Arc` is shared by that task, so the manager stays alive for as long as either a caller
    /// holds it or the task has not yet observed `close`.
    pub fn new(options: ManagerOptions, dialer: Arc<dyn RemoteDialer>, executor: &Executor) -> Arc<Self> {
        appimage::init();

        let process_manager =
            if options.untrusted_env { ProcessManager::noop() } else { ProcessManager::new() };
        let (notifier, mut wake) = ParentNotifier::channel();

        let manager = Arc::new(ResourceManager {
            graph: Graph::new(),
            process_manager,
            options,
            dialer,
            constructors: RwLock::new(HashMap::default()),
            client_constructors: RwLock::new(HashMap::default()),
            remotes: Mutex::new(HashMap::default()),
            built_models: Mutex::new(HashMap::default()),
            config_mutex: tokio::sync::Mutex::new(()),
            cancellation: CancellationToken::new(),
            stats: Mutex::new(Stats::default()),
            notifier,
        });

        let background = manager.clone();
        executor.native_spawn(async move {
            loop {
                tokio::select! {
                    _ = background.cancellation.cancelled() => break,
                    changed = wake.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Err(e) = background.run_remote_wake_pass().await {
                            log::warn!("remote-triggered reconfigure pass failed: {e}");
                        }
                    }
                }
            }
        });

        manager
    }

    pub fn register_constructor(&self, api: Api, constructor: Arc<dyn ResourceConstructor>) {
        self.constructors.write().insert(api, constructor);
    }

    pub fn register_client_constructor(&self, api: Api, constructor: Arc<dyn ClientConstructor>) {
        self.client_constructors.write().insert(api, constructor);
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    /// Applies one configuration diff: marks removed items (and their descendants), marks added
    /// and modified items with fresh configs, dials any added/modified remotes, then runs the
    /// resolve + reverse-topological build/reconfigure/close sweep. Held under the configuration
    /// mutex for the whole pass, per the concurrency model's single-active-pass invariant.
    pub async fn apply_diff(&self, diff: ConfigDiff) -> Result<ReconfigureReport, ManagerError> {
        let _guard = self.config_mutex.lock().await;

        let shadow = self.mark_removed(&diff.removed);
        let result = self.apply_diff_inner(&diff).await;
        shadow.stop();
        result
    }

    /// The fallible remainder of [`Self::apply_diff`], split out so that the throwaway shadow
    /// process manager is stopped on every exit path, including an early validation error.
    async fn apply_diff_inner(&self, diff: &ConfigDiff) -> Result<ReconfigureReport, ManagerError> {
        self.mark_added_modified(&diff.added)?;
        self.mark_added_modified(&diff.modified)?;

        let mut report = ReconfigureReport::default();
        for remote in diff.added.remotes.iter().chain(diff.modified.remotes.iter()) {
            self.connect_remote(remote, &mut report).await;
        }

        let mut built = self.resolve_and_build().await?;
        report.outcomes.append(&mut built.outcomes);
        Ok(report)
    }

    /// Phase one of diff application (spec §4.3.1): processes are handed off to a throwaway
    /// shadow manager so they can be stopped after this critical section without blocking it;
    /// components/services/remotes have their whole dependent subgraph marked for removal.
    fn mark_removed(&self, removed: &crate::diff::ConfigBucket) -> ProcessManager {
        let shadow = ProcessManager::new();
        for process in &removed.processes {
            self.process_manager.move_process_to(&process.id, &shadow);
        }

        for config in removed.components.iter().chain(removed.services.iter()) {
            if self.options.untrusted_env && is_shell_service(&config.name.api) {
                continue;
            }
            let subgraph = self.graph.sub_graph_from(&config.name);
            self.graph.mark_for_removal(&subgraph);
        }

        for remote in &removed.remotes {
            self.remotes.lock().remove(&remote.name);
            let name = Name::new(Api::remote(), remote.name.clone());
            let subgraph = self.graph.sub_graph_from(&name);
            self.graph.mark_for_removal(&subgraph);
        }

        shadow
    }

    /// Phase two of diff application (spec §4.3.2): installs a new config/dependency list on each
    /// added or modified component/service, creating the node if absent, and starts any added
    /// processes. Policy gates reject the shell service and arbitrary processes outright in an
    /// untrusted environment.
    fn mark_added_modified(&self, bucket: &crate::diff::ConfigBucket) -> Result<(), ManagerError> {
        for config in bucket.components.iter().chain(bucket.services.iter()) {
            if self.options.untrusted_env && is_shell_service(&config.name.api) {
                return Err(ManagerError::ShellServiceDisabled);
            }
            self.graph.clear_parent_edges(&config.name);
            let config = config.clone();
            self.graph.with_entry_mut(&config.name.clone(), |entry| {
                entry.set_new_config(config.clone(), config.depends_on.clone());
            });
        }

        for process in &bucket.processes {
            if self.options.untrusted_env {
                return Err(ManagerError::ProcessesDisabled);
            }
            if let Err(e) = self.process_manager.add_process_from_config(process) {
                log::warn!("failed to start process `{}`: {e}", process.id);
            }
        }

        Ok(())
    }

    /// Dials one remote per the policy in `robot_net::dial_options`, attaches it as a graph node
    /// and runs its first resource-name reconciliation. Dial and policy failures are recorded on
    /// the remote's own node rather than aborting the pass: remote-level errors are retried on
    /// the next trigger, never fatal to the rest of the diff.
    async fn connect_remote(&self, remote: &RemoteConfig, report: &mut ReconfigureReport) {
        let name = Name::new(Api::remote(), remote.name.clone());
        self.graph.upsert_node(&name);

        let options = match robot_net::dial_options(remote, self.options.debug, self.options.allow_insecure_creds) {
            Ok(options) => options,
            Err(e) => {
                let err = BuildError::DialFailed { name: name.clone(), reason: e.to_string() };
                self.graph.with_entry_mut(&name, |entry| entry.record_error(err.clone()));
                log::warn!("dial policy rejected remote `{}`: {e}", remote.name);
                report.push(name, ResourceOutcome::Failed(err));
                return;
            }
        };

        let connection = match self.dialer.dial(&options).await {
            Ok(connection) => connection,
            Err(e) => {
                let err = BuildError::DialFailed { name: name.clone(), reason: e.clone() };
                self.graph.with_entry_mut(&name, |entry| entry.record_error(err.clone()));
                log::warn!("failed to dial remote `{}`: {e}", remote.name);
                report.push(name, ResourceOutcome::Failed(err));
                return;
            }
        };

        connection.set_parent_notifier(self.notifier.clone());
        let handle: ResourceHandle = Arc::new(RemoteNodeResource);
        self.graph.with_entry_mut(&name, |entry| {
            entry.swap_resource(handle);
        });
        self.remotes
            .lock()
            .insert(remote.name.clone(), RemoteEntry { config: remote.clone(), connection: connection.clone() });

        report.push(name.clone(), ResourceOutcome::Built);

        if let Err(e) = self.update_remote_resource_names(&remote.name, &connection).await {
            log::warn!("initial reconciliation of remote `{}` failed: {e}", remote.name);
        }
    }

    /// Spec §4.3.4: reconciles one remote's subtree against its current `ResourceNames()`. New
    /// names are grafted as children of the remote-node (model `unknown`); names no longer
    /// present propagate `needs-update` down their local dependents and are marked for removal.
    /// Returns whether anything changed, so a wake-triggered caller can skip a needless rebuild
    /// pass.
    async fn update_remote_resource_names(
        &self,
        remote_local_name: &str,
        connection: &Arc<dyn RemoteConnection>,
    ) -> Result<bool, String> {
        let remote_node_name = Name::new(Api::remote(), remote_local_name);
        let old: std::collections::HashSet<Name> = self
            .graph
            .sub_graph_from(&remote_node_name)
            .into_iter()
            .filter(|n| n != &remote_node_name)
            .collect();

        let remote_names = connection.resource_names().await?;
        let mut new: std::collections::HashSet<Name> = std::collections::HashSet::new();
        let mut changed = false;

        for bare_name in remote_names {
            let qualified = bare_name.prepend_remote(remote_local_name);
            new.insert(qualified.clone());
            if old.contains(&qualified) {
                continue;
            }

            let Some(client_constructor) = self.client_constructors.read().get(&qualified.api).cloned() else {
                log::warn!(
                    "remote `{remote_local_name}` exposes API `{}` but no client is registered for it locally",
                    qualified.api
                );
                continue;
            };

            self.graph.upsert_node(&qualified);
            if let Err(e) = self.graph.add_child(&qualified, &remote_node_name) {
                log::warn!("could not attach remote resource `{qualified}`: {e}");
                continue;
            }

            match client_constructor.construct_client(&qualified, connection).await {
                Ok(handle) => {
                    self.graph.with_entry_mut(&qualified, |entry| {
                        entry.swap_resource(handle);
                    });
                    // Spec §3 invariant 3: a remote-origin node's model is always `unknown`.
                    self.built_models.lock().insert(qualified.clone(), Model::unknown());
                    changed = true;
                }
                Err(e) => log::warn!("failed to build a client for remote resource `{qualified}`: {e}"),
            }
        }

        let stale: Vec<Name> = old.difference(&new).cloned().collect();
        for name in &stale {
            for descendant in self.graph.get_all_children_of(name) {
                self.graph.with_entry_mut(&descendant, |entry| entry.set_needs_update());
            }
        }
        if !stale.is_empty() {
            self.graph.mark_for_removal(&stale);
            changed = true;
        }

        Ok(changed)
    }

    /// Re-runs reconciliation for every connected remote in response to a parent-notifier wake,
    /// then a full rebuild sweep if anything actually changed. Idempotent: a spurious wake with
    /// no real change yields zero graph mutations and zero driver calls.
    async fn run_remote_wake_pass(&self) -> Result<(), ManagerError> {
        let _guard = self.config_mutex.lock().await;

        let remotes: Vec<(String, Arc<dyn RemoteConnection>)> =
            self.remotes.lock().iter().map(|(name, entry)| (name.clone(), entry.connection.clone())).collect();

        let mut any_changed = false;
        for (name, connection) in &remotes {
            match self.update_remote_resource_names(name, connection).await {
                Ok(changed) => any_changed |= changed,
                Err(e) => log::warn!("remote reconciliation for `{name}` failed: {e}"),
            }
        }

        if any_changed {
            self.resolve_and_build().await?;
        }
        Ok(())
    }

    /// Resolves every node's symbolic dependency list into graph edges, then walks the graph in
    /// reverse topological order building uninitialized nodes and reconfiguring or rebuilding
    /// modified ones (spec §4.3.3's second sweep), and finally sweeps away everything marked for
    /// removal, closing handles leaves-first.
    async fn resolve_and_build(&self) -> Result<ReconfigureReport, ManagerError> {
        self.graph.resolve_dependencies(|dep| self.resolve_dependency_name(dep));

        let mut report = ReconfigureReport::default();
        for name in self.graph.reverse_topological_sort() {
            if name.is_remote_origin() {
                // Remote-origin nodes are built exclusively by `update_remote_resource_names`.
                continue;
            }
            let Some(entry) = self.graph.node(&name) else { continue };
            if entry.is_marked_for_removal() || !entry.needs_pass() {
                continue;
            }
            let Some(config) = entry.config_state().config().cloned() else { continue };

            if let Err(reason) = config.validate() {
                let err = BuildError::InvalidConfig { name: name.clone(), reason };
                self.graph.with_entry_mut(&name, |e| e.record_error(err.clone()));
                self.stats.lock().failed += 1;
                report.push(name, ResourceOutcome::Failed(err));
                continue;
            }

            let mut deps = Dependencies::new();
            let mut missing = None;
            for dep_name in self.graph.direct_parents_of(&name) {
                match self.graph.node(&dep_name).and_then(|e| e.resource().cloned()) {
                    Some(handle) => deps.insert(dep_name.qualified_string(), handle),
                    None => {
                        missing = Some(dep_name);
                        break;
                    }
                }
            }
            if let Some(dependency) = missing {
                let err = BuildError::DependencyUnavailable { name: name.clone(), dependency };
                self.graph.with_entry_mut(&name, |e| e.record_error(err.clone()));
                self.stats.lock().failed += 1;
                report.push(name, ResourceOutcome::Failed(err));
                continue;
            }

            let is_new = entry.is_uninitialized();
            let old_handle = entry.unsafe_resource().cloned();
            match self.process_resource(&name, &config, &deps, is_new, old_handle).await {
                Ok((handle, rebuilt)) => {
                    self.graph.with_entry_mut(&name, |e| {
                        e.swap_resource(handle);
                    });
                    self.built_models.lock().insert(name.clone(), config.model.clone());

                    let outcome = if is_new {
                        self.stats.lock().built += 1;
                        ResourceOutcome::Built
                    } else if rebuilt {
                        self.stats.lock().rebuilt += 1;
                        ResourceOutcome::Rebuilt
                    } else {
                        self.stats.lock().reconfigured += 1;
                        ResourceOutcome::Reconfigured
                    };

                    if is_new || rebuilt {
                        for descendant in self.graph.get_all_children_of(&name) {
                            self.graph.with_entry_mut(&descendant, |e| e.set_needs_update());
                        }
                    }
                    report.push(name, outcome);
                }
                Err(err) => {
                    self.graph.with_entry_mut(&name, |e| e.record_error(err.clone()));
                    self.stats.lock().failed += 1;
                    report.push(name, ResourceOutcome::Failed(err));
                }
            }
        }

        for (name, handle) in self.graph.remove_marked() {
            if let Some(handle) = handle {
                if let Err(e) = handle.close().await {
                    log::warn!("error closing resource `{name}`: {e}");
                }
            }
            self.built_models.lock().remove(&name);
            self.stats.lock().closed += 1;
            report.push(name, ResourceOutcome::Closed);
        }

        Ok(report)
    }

    /// Spec §4.3.3's `processResource`: constructs a fresh resource for an uninitialized node;
    /// otherwise reconfigures in place when the model is unchanged (escalating to a rebuild on
    /// `MustRebuild` or a model change), closing the previous handle before building the
    /// replacement.
    async fn process_resource(
        &self,
        name: &Name,
        config: &ResourceConfig,
        deps: &Dependencies,
        is_new: bool,
        old_handle: Option<ResourceHandle>,
    ) -> Result<(ResourceHandle, bool), BuildError> {
        if is_new {
            let handle = self.construct(name, config, deps).await?;
            return Ok((handle, true));
        }

        let previous_model = self.built_models.lock().get(name).cloned();
        let model_changed = previous_model.as_ref() != Some(&config.model);

        if !model_changed {
            if let Some(handle) = &old_handle {
                match handle.reconfigure(deps, config).await {
                    ReconfigureOutcome::Reconfigured => return Ok((handle.clone(), false)),
                    ReconfigureOutcome::MustRebuild => {
                        log::debug!("resource `{name}` requested a full rebuild during reconfigure");
                    }
                    ReconfigureOutcome::Failed(reason) => {
                        return Err(BuildError::ConstructionFailed {
                            name: name.clone(),
                            model: config.model.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        if let Some(handle) = old_handle {
            if let Err(e) = handle.close().await {
                log::warn!("error closing previous resource `{name}` ahead of rebuild: {e}");
            }
        }
        let handle = self.construct(name, config, deps).await?;
        Ok((handle, true))
    }

    async fn construct(
        &self,
        name: &Name,
        config: &ResourceConfig,
        deps: &Dependencies,
    ) -> Result<ResourceHandle, BuildError> {
        let constructor = self.constructors.read().get(&name.api).cloned();
        let Some(constructor) = constructor else {
            return Err(BuildError::ConstructionFailed {
                name: name.clone(),
                model: config.model.clone(),
                reason: format!("no constructor registered for API `{}`", name.api),
            });
        };
        constructor.construct(name, config, deps).await.map_err(|reason| BuildError::ConstructionFailed {
            name: name.clone(),
            model: config.model.clone(),
            reason,
        })
    }

    /// Turns a symbolic dependency string into a node key: tries a fully (or partially remote-)
    /// qualified match first, then falls back to a cross-remote partial match. Ambiguous matches
    /// are logged and left unresolved rather than guessed at; the next pass retries them.
    fn resolve_dependency_name(&self, dep: &str) -> Option<Name> {
        let names = self.graph.names();

        let mut qualified: Vec<Name> = names.iter().filter(|n| n.matches_qualified_query(dep)).cloned().collect();
        if qualified.len() == 1 {
            return qualified.pop();
        }
        if qualified.len() > 1 {
            log::warn!("dependency `{dep}` matches more than one fully-qualified resource; leaving unresolved");
            return None;
        }

        let mut short: Vec<Name> = names.into_iter().filter(|n| n.matches_short_query(dep)).collect();
        match short.len() {
            1 => short.pop(),
            0 => None,
            _ => {
                log::warn!("dependency `{dep}` is ambiguous across remotes; leaving unresolved");
                None
            }
        }
    }

    /// Resolves a query to a single live resource handle: a fully (or remote-) qualified query is
    /// tried first, then a cross-remote partial match ignoring remote path, mirroring
    /// `resolve_dependency_name`'s precedence but surfacing ambiguity to the caller as
    /// `RemoteResourceClash` rather than silently deferring it.
    pub fn resource_by_name(&self, query: &str) -> Result<ResourceHandle, ManagerError> {
        let names = self.graph.names();

        let qualified: Vec<Name> = names.iter().filter(|n| n.matches_qualified_query(query)).cloned().collect();
        if qualified.len() == 1 {
            return self.resolve(&qualified[0]);
        }
        if qualified.len() > 1 {
            return Err(ManagerError::RemoteResourceClash { query: query.to_owned(), candidates: qualified });
        }

        let candidates: Vec<Name> = names.into_iter().filter(|n| n.matches_short_query(query)).collect();
        match candidates.len() {
            0 => Err(ManagerError::NotFound { query: query.to_owned() }),
            1 => self.resolve(&candidates[0]),
            _ => Err(ManagerError::RemoteResourceClash { query: query.to_owned(), candidates }),
        }
    }

    fn resolve(&self, name: &Name) -> Result<ResourceHandle, ManagerError> {
        let entry = self.graph.node(name).ok_or_else(|| ManagerError::NotFound { query: name.qualified_string() })?;
        match entry.resource() {
            Some(handle) => Ok(handle.clone()),
            None => match entry.last_error() {
                Some(err) => Err(ManagerError::NotAvailable { name: name.clone(), cause: err.clone() }),
                None => Err(ManagerError::NotFound { query: name.qualified_string() }),
            },
        }
    }

    /// Resolves a dependency name used the way a frame-system-like topological input would: a
    /// single unqualified match is required, since a named parent that doesn't exist (or is
    /// ambiguous) cannot be used as a topological reference.
    pub fn resolve_named_parent(&self, child: &Name, parent_query: &str) -> Result<Name, ManagerError> {
        let matches: Vec<Name> = self.graph.names().into_iter().filter(|n| n.matches_short_query(parent_query)).collect();
        match matches.as_slice() {
            [one] => Ok(one.clone()),
            _ => Err(ManagerError::MissingParent { name: child.clone(), parent: parent_query.to_owned() }),
        }
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remotes.lock().keys().cloned().collect()
    }

    pub fn remote_by_name(&self, name: &str) -> Option<Arc<dyn RemoteConnection>> {
        self.remotes.lock().get(name).map(|entry| entry.connection.clone())
    }

    /// Native resource names only: excludes remote-node pseudo-entries and any other
    /// internally-namespaced bookkeeping node, but includes resources grafted from a remote.
    pub fn resource_names(&self) -> Vec<Name> {
        self.graph.names().into_iter().filter(|n| n.api.namespace != Namespace::RdkInternal).collect()
    }

    /// The model last built for `name`, if any. Spec §3 invariant 3: a remote-origin name always
    /// reports `Model::unknown()` here, since its config (and therefore its real model) lives on
    /// the remote, not in this manager's diff.
    pub fn resource_model(&self, name: &Name) -> Option<Model> {
        self.built_models.lock().get(name).cloned()
    }

    /// Spec §4.3.7: the union of natively registered APIs and every connected remote's
    /// `ResourceRPCAPIs()`. Native descriptors always win a conflict, regardless of remote
    /// iteration order.
    pub async fn resource_rpc_apis(&self) -> Vec<Api> {
        let mut union: std::collections::BTreeMap<Api, ()> = std::collections::BTreeMap::new();
        for api in self.constructors.read().keys().cloned() {
            union.insert(api, ());
        }

        let connections: Vec<Arc<dyn RemoteConnection>> =
            self.remotes.lock().values().map(|entry| entry.connection.clone()).collect();
        for connection in connections {
            match connection.resource_rpc_apis().await {
                Ok(apis) => {
                    for api in apis {
                        if union.contains_key(&api) {
                            log::warn!("remote API `{api}` conflicts with a natively registered API; keeping the native one");
                        } else {
                            union.insert(api, ());
                        }
                    }
                }
                Err(e) => log::warn!("failed to fetch RPC APIs from a remote: {e}"),
            }
        }

        union.into_keys().collect()
    }

    /// Spec §4.3.6: marks the entire current graph for removal (except the internal web service,
    /// which the caller closes last since it carries any in-flight RPC), stops the process
    /// sub-manager, and sweeps everything else closed leaves-first. Also stops the background
    /// remote-wake task.
    pub async fn close(&self) -> Result<(), ManagerError> {
        self.cancellation.cancel();

        let snapshot = self.graph.clone_structure();
        let names: Vec<Name> = snapshot.names().into_iter().filter(|n| !is_internal_web_service(&n.api)).collect();
        self.graph.mark_for_removal(&names);

        self.process_manager.stop();

        for (name, handle) in self.graph.remove_marked() {
            if let Some(handle) = handle {
                if let Err(e) = handle.close().await {
                    log::warn!("error closing resource `{name}` during manager close: {e}");
                }
            }
            self.built_models.lock().remove(&name);
        }

        Ok(())
    }
}

// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be
// copied and pasted across crates, but there doesn't appear to be a way to include inner
// attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

//! A typed, acyclic dependency graph of resources.
//!
//! `Graph` has no knowledge of what a resource actually *is*: it is generic over a node key `K`
//! (a resource's identity), a config type `C`, a built-resource handle type `H` and an error
//! type `E`. The resource manager instantiates it with `resource_name::Name`, its own config,
//! handle and error types; `graph` itself only ever reasons about edges, topological order and
//! the per-node [`entry::Entry`] state machine.

pub mod entry;

use std::fmt;

use fnv::FnvHashMap as HashMap;
use fnv::FnvHashSet as HashSet;
use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::sync::Arc;

pub use crate::entry::{ConfigState, Entry};

/// Bound satisfied by any resource identity usable as a graph key: names must be hashable (for
/// the index), orderable (for the alphabetical tie-break required of topological sorts) and
/// displayable (for error messages and logging).
pub trait NodeKey: Clone + Eq + std::hash::Hash + Ord + fmt::Display + fmt::Debug {}
impl<T: Clone + Eq + std::hash::Hash + Ord + fmt::Display + fmt::Debug> NodeKey for T {}

#[derive(Debug, Eq, PartialEq)]
pub enum GraphError {
    DuplicateNode(String),
    UnknownNode(String),
    Cycle { child: String, parent: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateNode(name) => {
                write!(f, "a node named `{name}` is already present in the graph")
            }
            GraphError::UnknownNode(name) => {
                write!(f, "no node named `{name}` is present in the graph")
            }
            GraphError::Cycle { child, parent } => write!(
                f,
                "adding an edge from `{child}` to `{parent}` would introduce a cycle"
            ),
        }
    }
}

impl std::error::Error for GraphError {}

type PGraph<K, C, H, E> = DiGraph<(K, Entry<C, H, E>), ()>;

struct InnerGraph<K: NodeKey, C, H, E> {
    nodes: HashMap<K, NodeIndex>,
    pg: PGraph<K, C, H, E>,
}

impl<K: NodeKey, C: Clone, H: Clone, E: Clone> InnerGraph<K, C, H, E> {
    fn index_of(&self, name: &K) -> Option<NodeIndex> {
        self.nodes.get(name).copied()
    }

    fn ensure_index(&mut self, name: &K) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.pg.add_node((name.clone(), Entry::new()));
        self.nodes.insert(name.clone(), idx);
        idx
    }

    fn entry(&self, idx: NodeIndex) -> &Entry<C, H, E> {
        &self.pg[idx].1
    }

    fn entry_mut(&mut self, idx: NodeIndex) -> &mut Entry<C, H, E> {
        &mut self.pg[idx].1
    }

    /// Kahn's algorithm, breaking ties alphabetically by name so that build order is
    /// deterministic across runs regardless of insertion order.
    fn topological_sort(&self) -> Vec<K> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::default();
        for idx in self.pg.node_indices() {
            in_degree.insert(idx, self.pg.edges_directed(idx, Direction::Incoming).count());
        }

        let mut ready: std::collections::BTreeSet<(K, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&idx, _)| (self.pg[idx].0.clone(), idx))
            .collect();

        let mut order = Vec::with_capacity(self.pg.node_count());
        while let Some((name, idx)) = ready.iter().next().cloned() {
            ready.remove(&(name.clone(), idx));
            order.push(name);

            for edge in self.pg.edges_directed(idx, Direction::Outgoing) {
                let dst = edge.target();
                let deg = in_degree.get_mut(&dst).expect("missing in-degree entry");
                *deg -= 1;
                if *deg == 0 {
                    ready.insert((self.pg[dst].0.clone(), dst));
                }
            }
        }

        order
    }

    fn walk(&self, roots: Vec<NodeIndex>, direction: Direction) -> HashSet<NodeIndex> {
        let mut seen: HashSet<NodeIndex> = HashSet::default();
        let mut queue: std::collections::VecDeque<NodeIndex> = roots.into_iter().collect();
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) {
                continue;
            }
            for next in self.pg.neighbors_directed(idx, direction) {
                queue.push_back(next);
            }
        }
        seen
    }
}

/// A DAG of resources, enforced acyclic on every mutation.
pub struct Graph<K: NodeKey, C, H, E> {
    inner: Arc<Mutex<InnerGraph<K, C, H, E>>>,
}

impl<K: NodeKey, C, H, E> Clone for Graph<K, C, H, E> {
    fn clone(&self) -> Self {
        Graph { inner: self.inner.clone() }
    }
}

impl<K: NodeKey, C: Clone, H: Clone, E: Clone> Graph<K, C, H, E> {
    pub fn new() -> Self {
        Graph {
            inner: Arc::new(Mutex::new(InnerGraph {
                nodes: HashMap::default(),
                pg: DiGraph::new(),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Inserts a fresh, uninitialized node. Fails if a node of that name is already present: use
    /// [`Graph::upsert_node`] when the caller wants get-or-create semantics (the usual case when
    /// applying a config diff).
    pub fn add_node(&self, name: K) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name.to_string()));
        }
        inner.ensure_index(&name);
        Ok(())
    }

    /// Returns the node of this name, creating an uninitialized one if absent. Returns whether
    /// the node already existed.
    pub fn upsert_node(&self, name: &K) -> bool {
        let mut inner = self.inner.lock();
        let existed = inner.nodes.contains_key(name);
        inner.ensure_index(name);
        existed
    }

    pub fn node(&self, name: &K) -> Option<Entry<C, H, E>> {
        let inner = self.inner.lock();
        inner.index_of(name).map(|idx| inner.entry(idx).clone())
    }

    pub fn names(&self) -> Vec<K> {
        let inner = self.inner.lock();
        inner.nodes.keys().cloned().collect()
    }

    pub fn contains(&self, name: &K) -> bool {
        self.inner.lock().nodes.contains_key(name)
    }

    /// Mutates the entry for `name` in place via `f`, creating an uninitialized entry first if
    /// one is not already present.
    pub fn with_entry_mut<R>(&self, name: &K, f: impl FnOnce(&mut Entry<C, H, E>) -> R) -> R {
        let mut inner = self.inner.lock();
        let idx = inner.ensure_index(name);
        f(inner.entry_mut(idx))
    }

    /// Inserts the edge `child -> parent` ("child depends on parent"), creating either endpoint
    /// as an uninitialized node if it is not yet present (a node may be referenced as a
    /// dependency before its own config has arrived). Fails if the edge would close a cycle.
    pub fn add_child(&self, child: &K, parent: &K) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        let child_idx = inner.ensure_index(child);
        let parent_idx = inner.ensure_index(parent);

        if child_idx == parent_idx {
            return Err(GraphError::Cycle { child: child.to_string(), parent: parent.to_string() });
        }
        // If `parent` can already reach `child`, then adding `child -> parent` would close a
        // cycle back through `parent`.
        if petgraph::algo::has_path_connecting(&inner.pg, parent_idx, child_idx, None) {
            return Err(GraphError::Cycle { child: child.to_string(), parent: parent.to_string() });
        }

        if inner.pg.find_edge(child_idx, parent_idx).is_none() {
            inner.pg.add_edge(child_idx, parent_idx, ());
        }
        Ok(())
    }

    pub fn remove_child(&self, child: &K, parent: &K) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        let child_idx = inner
            .index_of(child)
            .ok_or_else(|| GraphError::UnknownNode(child.to_string()))?;
        let parent_idx = inner
            .index_of(parent)
            .ok_or_else(|| GraphError::UnknownNode(parent.to_string()))?;
        if let Some(edge) = inner.pg.find_edge(child_idx, parent_idx) {
            inner.pg.remove_edge(edge);
        }
        Ok(())
    }

    /// Removes every outgoing edge (dependency) of `name`, in preparation for re-deriving them
    /// from a new config's dependency list.
    pub fn clear_parent_edges(&self, name: &K) {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.index_of(name) else { return };
        let edge_ids: Vec<_> = inner
            .pg
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge_id in edge_ids {
            inner.pg.remove_edge(edge_id);
        }
    }

    /// The nodes `name` directly depends on.
    pub fn direct_parents_of(&self, name: &K) -> Vec<K> {
        let inner = self.inner.lock();
        let Some(idx) = inner.index_of(name) else { return Vec::new() };
        inner
            .pg
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|i| inner.pg[i].0.clone())
            .collect()
    }

    /// The nodes that directly depend on `name`.
    pub fn direct_children_of(&self, name: &K) -> Vec<K> {
        let inner = self.inner.lock();
        let Some(idx) = inner.index_of(name) else { return Vec::new() };
        inner
            .pg
            .neighbors_directed(idx, Direction::Incoming)
            .map(|i| inner.pg[i].0.clone())
            .collect()
    }

    /// All transitive dependencies of `name` (not including `name` itself).
    pub fn get_all_parents_of(&self, name: &K) -> Vec<K> {
        let inner = self.inner.lock();
        let Some(idx) = inner.index_of(name) else { return Vec::new() };
        let mut seen = inner.walk(vec![idx], Direction::Outgoing);
        seen.remove(&idx);
        seen.into_iter().map(|i| inner.pg[i].0.clone()).collect()
    }

    /// All transitive dependents of `name` (not including `name` itself).
    pub fn get_all_children_of(&self, name: &K) -> Vec<K> {
        let inner = self.inner.lock();
        let Some(idx) = inner.index_of(name) else { return Vec::new() };
        let mut seen = inner.walk(vec![idx], Direction::Incoming);
        seen.remove(&idx);
        seen.into_iter().map(|i| inner.pg[i].0.clone()).collect()
    }

    /// `root` plus every node that transitively depends on it, i.e. the subgraph that must be
    /// considered together when `root` is removed or invalidated.
    pub fn sub_graph_from(&self, root: &K) -> Vec<K> {
        let inner = self.inner.lock();
        let Some(idx) = inner.index_of(root) else { return Vec::new() };
        inner
            .walk(vec![idx], Direction::Incoming)
            .into_iter()
            .map(|i| inner.pg[i].0.clone())
            .collect()
    }

    /// Stable topological order: for every edge `u -> v` ("u depends on v"), `u` precedes `v`.
    /// Ties are broken alphabetically. Dependents precede dependencies, which is the order in
    /// which marked nodes must be closed (leaves-first).
    pub fn topological_sort(&self) -> Vec<K> {
        self.inner.lock().topological_sort()
    }

    /// The reverse of [`Graph::topological_sort`]: dependencies precede dependents, which is the
    /// order in which nodes must be built or reconfigured so that every dependency is ready
    /// before its dependent is processed.
    pub fn reverse_topological_sort(&self) -> Vec<K> {
        let mut order = self.topological_sort();
        order.reverse();
        order
    }

    /// Rewrites every node's symbolic dependency strings into graph edges, using `resolver` to
    /// turn a dependency string into a node key. Unresolved dependencies are logged and skipped:
    /// the node that referenced them is left without that edge (and so stays, or remains,
    /// uninitialized if it can never be built), but the pass continues for every other node.
    pub fn resolve_dependencies(&self, resolver: impl Fn(&str) -> Option<K>) {
        let pending: Vec<(K, Vec<String>)> = {
            let inner = self.inner.lock();
            inner
                .pg
                .node_indices()
                .filter_map(|idx| {
                    let (name, entry) = &inner.pg[idx];
                    match entry.config_state() {
                        ConfigState::Configured { dependencies, .. } => {
                            Some((name.clone(), dependencies.clone()))
                        }
                        ConfigState::Uninitialized => None,
                    }
                })
                .collect()
        };

        for (name, deps) in pending {
            self.clear_parent_edges(&name);
            for dep in deps {
                match resolver(&dep) {
                    Some(parent) => {
                        if let Err(e) = self.add_child(&name, &parent) {
                            log::warn!("dependency `{dep}` of `{name}` could not be linked: {e}");
                        }
                    }
                    None => {
                        log::warn!("dependency `{dep}` of `{name}` did not resolve to any node");
                    }
                }
            }
        }
    }

    /// Marks every node in `names` for removal.
    pub fn mark_for_removal(&self, names: &[K]) {
        let mut inner = self.inner.lock();
        for name in names {
            if let Some(idx) = inner.index_of(name) {
                inner.entry_mut(idx).mark_for_removal();
            }
        }
    }

    /// Removes every node marked for removal, returning their resource handles (if any) in
    /// topological order (dependents before dependencies) so the caller can close them
    /// leaves-first.
    pub fn remove_marked(&self) -> Vec<(K, Option<H>)> {
        let mut inner = self.inner.lock();
        let marked: Vec<NodeIndex> = inner
            .pg
            .node_indices()
            .filter(|&idx| inner.entry(idx).is_marked_for_removal())
            .collect();
        let marked_set: HashSet<NodeIndex> = marked.iter().copied().collect();

        // Determine removal order via a Kahn's pass restricted to the marked subgraph only, to
        // avoid disturbing surviving nodes' ordering.
        let order = {
            let mut in_degree: HashMap<NodeIndex, usize> = HashMap::default();
            for &idx in &marked {
                let deg = inner
                    .pg
                    .edges_directed(idx, Direction::Incoming)
                    .filter(|e| marked_set.contains(&e.source()))
                    .count();
                in_degree.insert(idx, deg);
            }
            let mut ready: std::collections::BTreeSet<(K, NodeIndex)> = in_degree
                .iter()
                .filter(|(_, &deg)| deg == 0)
                .map(|(&idx, _)| (inner.pg[idx].0.clone(), idx))
                .collect();
            let mut order = Vec::with_capacity(marked.len());
            while let Some((name, idx)) = ready.iter().next().cloned() {
                ready.remove(&(name.clone(), idx));
                order.push(idx);
                for edge in inner.pg.edges_directed(idx, Direction::Outgoing) {
                    let dst = edge.target();
                    if let Some(deg) = in_degree.get_mut(&dst) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert((inner.pg[dst].0.clone(), dst));
                        }
                    }
                }
            }
            order
        };

        // Removal order was computed as a list of indices, but `petgraph::DiGraph::remove_node`
        // invalidates other indices on every call: it swaps the graph's last node into the
        // removed slot to keep storage contiguous, so any other `NodeIndex` pointing at that
        // last node silently starts pointing at the wrong (or a removed) node. Re-resolve each
        // node by name through the up-to-date index map immediately before removing it, and fix
        // up the index of whichever node gets swapped into the vacated slot.
        let order: Vec<K> = order.into_iter().map(|idx| inner.pg[idx].0.clone()).collect();

        let mut removed = Vec::with_capacity(order.len());
        for name in order {
            let idx = inner.index_of(&name).expect("marked node must still be indexed");
            let handle = inner.entry_mut(idx).take_resource();
            let last_idx = NodeIndex::new(inner.pg.node_count() - 1);
            inner.pg.remove_node(idx);
            if idx != last_idx {
                let moved_name = inner.pg[idx].0.clone();
                inner.nodes.insert(moved_name, idx);
            }
            inner.nodes.remove(&name);
            removed.push((name, handle));
        }
        removed
    }

    /// A shallow structural copy: every entry is cloned as-is (resource handles are typically
    /// cheap `Arc` clones), used to compute "everything currently present" ahead of a full
    /// manager close.
    pub fn clone_structure(&self) -> Graph<K, C, H, E> {
        let inner = self.inner.lock();
        let cloned = InnerGraph { nodes: inner.nodes.clone(), pg: inner.pg.clone() };
        Graph { inner: Arc::new(Mutex::new(cloned)) }
    }
}

impl<K: NodeKey, C: Clone, H: Clone, E: Clone> Default for Graph<K, C, H, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;

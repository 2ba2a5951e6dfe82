// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The per-resource state machine described as "Graph Node" in the resource manager's data
//! model: config state, reconfigure/update flags, last error, resource handle and removal mark.

/// What the graph currently knows about a node's declarative configuration.
///
/// A node starts `Uninitialized` (created only because something depends on it, or because a
/// dependency name could not yet be resolved) and becomes `Configured` once a diff supplies a
/// config and a symbolic dependency list for it.
#[derive(Clone, Debug)]
pub enum ConfigState<C> {
    Uninitialized,
    Configured { config: C, dependencies: Vec<String> },
}

impl<C> ConfigState<C> {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, ConfigState::Uninitialized)
    }

    pub fn config(&self) -> Option<&C> {
        match self {
            ConfigState::Uninitialized => None,
            ConfigState::Configured { config, .. } => Some(config),
        }
    }

    pub fn dependencies(&self) -> &[String] {
        match self {
            ConfigState::Uninitialized => &[],
            ConfigState::Configured { dependencies, .. } => dependencies,
        }
    }
}

/// A single node in the resource dependency graph.
///
/// `Entry` separates "what we've been told to build" (the [`ConfigState`]) from "what we've
/// actually built" (`resource`), mirroring the Entry/EntryResult split common to incremental
/// build graphs: a node can be `Configured` with a fresh config while still serving its
/// previously-built resource to concurrent readers, right up until the swap that installs the
/// new one.
#[derive(Clone, Debug)]
pub struct Entry<C, H, E> {
    config_state: ConfigState<C>,
    resource: Option<H>,
    needs_reconfigure: bool,
    needs_update: bool,
    failed: bool,
    last_error: Option<E>,
    marked_for_removal: bool,
}

impl<C, H, E> Entry<C, H, E> {
    pub fn new() -> Self {
        Entry {
            config_state: ConfigState::Uninitialized,
            resource: None,
            needs_reconfigure: false,
            needs_update: false,
            failed: false,
            last_error: None,
            marked_for_removal: false,
        }
    }

    pub fn config_state(&self) -> &ConfigState<C> {
        &self.config_state
    }

    pub fn is_uninitialized(&self) -> bool {
        self.config_state.is_uninitialized()
    }

    pub fn needs_reconfigure(&self) -> bool {
        self.needs_reconfigure
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// True if this entry must be visited by the next complete-config pass, either because its
    /// own config changed or because an ancestor was rebuilt.
    pub fn needs_pass(&self) -> bool {
        self.needs_reconfigure || self.needs_update || self.is_uninitialized()
    }

    /// Installs a new config and dependency list, setting the reconfigure flag. Called both when
    /// a node is first created by `markResourceForUpdate` and whenever a diff modifies it; the
    /// caller is responsible for erasing the node's parent edges beforehand, since they will be
    /// re-derived from `dependencies` during dependency resolution.
    pub fn set_new_config(&mut self, config: C, dependencies: Vec<String>) {
        self.config_state = ConfigState::Configured { config, dependencies };
        self.needs_reconfigure = true;
    }

    /// Marks this node for re-evaluation because one of its dependencies was newly built or
    /// rebuilt. A no-op on uninitialized nodes: they are already guaranteed a pass once resolved.
    pub fn set_needs_update(&mut self) {
        if !self.is_uninitialized() {
            self.needs_update = true;
        }
    }

    /// Installs a freshly built (or reconfigured-in-place) resource handle, clearing the
    /// reconfigure/update flags and any prior error. The old handle, if any, is returned so the
    /// caller can close it only *after* this swap is visible to concurrent readers.
    pub fn swap_resource(&mut self, handle: H) -> Option<H> {
        let old = self.resource.replace(handle);
        self.needs_reconfigure = false;
        self.needs_update = false;
        self.failed = false;
        self.last_error = None;
        old
    }

    /// Records a build/reconfigure/dial failure. The node keeps whatever resource it had (if
    /// any) so that `unsafe_resource` can still return it, but `resource` now reports
    /// unavailable. The reconfigure flags are left set so the next pass retries.
    pub fn record_error(&mut self, err: E) {
        self.failed = true;
        self.last_error = Some(err);
    }

    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// The live resource handle, present only when the node has been built successfully at
    /// least once and is not in a failed state.
    pub fn resource(&self) -> Option<&H> {
        if self.failed {
            None
        } else {
            self.resource.as_ref()
        }
    }

    /// The resource handle regardless of failure state. Used only by reconfigure paths that
    /// intend to pass the old resource to a replacement, or to close it on rebuild.
    pub fn unsafe_resource(&self) -> Option<&H> {
        self.resource.as_ref()
    }

    /// Removes and returns the resource handle, leaving the node without one. Used when closing
    /// the old handle ahead of a full rebuild, and by the sweep phase.
    pub fn take_resource(&mut self) -> Option<H> {
        self.resource.take()
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }
}

impl<C, H, E> Default for Entry<C, H, E> {
    fn default() -> Self {
        Self::new()
    }
}

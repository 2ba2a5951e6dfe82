// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The live resource handle the graph stores, and the small set of operations the manager needs
//! to perform on it: reconfigure in place, or close. Everything else about a resource (the arm,
//! camera, SLAM or motion driver it actually wraps) is an external collaborator's concern.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResourceConfig;
use resource_name::Name;

/// A reconfigure attempt's outcome beyond plain success/failure: a resource can ask the manager
/// to escalate to a full rebuild (close this handle, construct a fresh one) rather than
/// accepting an in-place reconfigure, e.g. because a changed attribute cannot be applied without
/// reopening a device.
#[derive(Debug)]
pub enum ReconfigureOutcome {
    Reconfigured,
    MustRebuild,
    Failed(String),
}

/// A live, built resource. The manager never downcasts this: it only reconfigures or closes it.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Applies a new config and dependency set to an already-built resource in place.
    async fn reconfigure(&self, deps: &Dependencies, config: &ResourceConfig) -> ReconfigureOutcome;

    /// Releases whatever the resource holds (file descriptors, device handles, RPC connections).
    /// Idempotent: the manager may call this on a resource it never successfully reconfigured.
    async fn close(&self) -> Result<(), String>;
}

/// A type-erased, cheaply cloneable handle to a built resource. Every graph node's `Handle` type
/// parameter is this: local (`builtin`) resources and remote-origin (`unknown`-model) resources
/// are both just an `Arc<dyn Resource>` as far as the graph is concerned.
pub type ResourceHandle = Arc<dyn Resource>;

/// The resolved dependency set handed to a resource at build or reconfigure time: the symbolic
/// names from its config, paired with the live handle each one resolved to.
#[derive(Clone, Default)]
pub struct Dependencies(HashMap<String, ResourceHandle>);

impl Dependencies {
    pub fn new() -> Self {
        Dependencies(HashMap::new())
    }

    pub fn insert(&mut self, dependency_name: impl Into<String>, handle: ResourceHandle) {
        self.0.insert(dependency_name.into(), handle);
    }

    pub fn get(&self, dependency_name: &str) -> Option<&ResourceHandle> {
        self.0.get(dependency_name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds a fresh resource for `name`/`model` from its config and resolved dependencies. External
/// drivers implement this per `(namespace, type, subtype)` API and register it with the manager;
/// the manager itself never knows how to build an arm or a camera.
#[async_trait]
pub trait ResourceConstructor: Send + Sync {
    async fn construct(
        &self,
        name: &Name,
        config: &ResourceConfig,
        deps: &Dependencies,
    ) -> Result<ResourceHandle, String>;
}

// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Every error the resource manager can surface to a caller, per the classification in its
//! error-handling design: config-level, build-level and remote-dial errors are recorded on a
//! node and do not abort a pass (a graph cycle is rejected the same way, by logging and skipping
//! the edge that would have introduced it); only lookup and policy errors raised directly from a
//! public API call propagate to the caller.

use std::fmt;

use resource_name::{Model, Name};

/// A build, reconfigure or dial failure recorded against one graph node. Carried as the `E` type
/// parameter of `graph::Graph`, so every entry's `last_error` is one of these.
#[derive(Clone, Debug)]
pub enum BuildError {
    /// The resource's config failed validation, either at diff-application time or defensively
    /// at build time.
    InvalidConfig { name: Name, reason: String },
    /// Construction, reconfiguration or a modular RPC failed.
    ConstructionFailed { name: Name, model: Model, reason: String },
    /// One of this resource's dependencies is not available this pass (it failed to build, or
    /// has not been resolved), so this resource cannot be (re)built either.
    DependencyUnavailable { name: Name, dependency: Name },
    /// Dialing a remote robot failed.
    DialFailed { name: Name, reason: String },
}

impl BuildError {
    pub fn name(&self) -> &Name {
        match self {
            BuildError::InvalidConfig { name, .. }
            | BuildError::ConstructionFailed { name, .. }
            | BuildError::DependencyUnavailable { name, .. }
            | BuildError::DialFailed { name, .. } => name,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidConfig { name, reason } => {
                write!(f, "resource `{name}` has an invalid config: {reason}")
            }
            BuildError::ConstructionFailed { name, model, reason } => {
                write!(f, "resource `{name}` (model `{model}`) failed to build: {reason}")
            }
            BuildError::DependencyUnavailable { name, dependency } => write!(
                f,
                "resource `{name}` cannot be built: dependency `{dependency}` is not available"
            ),
            BuildError::DialFailed { name, reason } => {
                write!(f, "remote `{name}` failed to dial: {reason}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Errors surfaced to a caller of the resource manager's public API.
#[derive(Debug)]
pub enum ManagerError {
    /// The shell service is disabled in an untrusted environment.
    ShellServiceDisabled,
    /// Arbitrary OS processes are disabled in an untrusted environment.
    ProcessesDisabled,
    /// No resource of this name is known to the graph.
    NotFound { query: String },
    /// A node exists but its last build attempt failed.
    NotAvailable { name: Name, cause: BuildError },
    /// An unqualified query matched resources under more than one remote.
    RemoteResourceClash { query: String, candidates: Vec<Name> },
    /// A dependency referenced by name could not be resolved to any node (used by
    /// frame-system-like topological inputs that require a named parent to exist).
    MissingParent { name: Name, parent: String },
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::ShellServiceDisabled => {
                write!(f, "the shell service is disabled in this untrusted environment")
            }
            ManagerError::ProcessesDisabled => {
                write!(f, "arbitrary processes are disabled in this untrusted environment")
            }
            ManagerError::NotFound { query } => write!(f, "no resource matches `{query}`"),
            ManagerError::NotAvailable { name, cause } => {
                write!(f, "resource `{name}` is not available: {cause}")
            }
            ManagerError::RemoteResourceClash { query, candidates } => write!(
                f,
                "`{query}` matches resources on more than one remote ({}); qualify with the remote's name",
                candidates
                    .iter()
                    .map(|n| n.qualified_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ManagerError::MissingParent { name, parent } => {
                write!(f, "resource `{name}` names `{parent}` as a parent, but no such resource exists")
            }
        }
    }
}

impl std::error::Error for ManagerError {}

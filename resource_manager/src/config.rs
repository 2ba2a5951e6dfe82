// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The declarative description of one resource, and the manager-wide options an external config
//! loader assembles and hands to the manager (the manager never reads a config file itself: file
//! parsing and diffing are external collaborators, per the resource manager's Non-goals).

use std::collections::BTreeMap;

use resource_name::{Model, Name};

/// A resource's attributes, opaque to the graph and to the manager: only the driver registered
/// for a resource's API interprets them. Represented as a flat string map rather than a JSON
/// value, since the manager never needs more structure than "look this attribute up by name".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

/// The declarative description of one resource: its name, model, opaque attributes and a list
/// of symbolic dependency names (resolved into graph edges by `Graph::resolve_dependencies`).
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub name: Name,
    pub model: Model,
    pub attributes: Attributes,
    pub depends_on: Vec<String>,
}

impl ResourceConfig {
    pub fn new(name: Name, model: Model) -> Self {
        ResourceConfig { name, model, attributes: Attributes::new(), depends_on: Vec::new() }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Defensive re-validation performed at build time, in addition to whatever the diff
    /// producer already did: partial-start rules can admit a config a strict validation pass
    /// would otherwise have rejected, so the manager checks again right before construction.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.local_name.is_empty() {
            return Err("resource name must not be empty".to_owned());
        }
        if self.model.family.is_empty() || self.model.name.is_empty() {
            return Err(format!("resource `{}` has an incomplete model", self.name));
        }
        if self.depends_on.iter().any(|d| d == &self.name.qualified_string()) {
            return Err(format!("resource `{}` cannot depend on itself", self.name));
        }
        Ok(())
    }
}

/// Manager-wide configuration, assembled by the embedding process (CLI or library caller) and
/// handed to `ResourceManager::new`.
#[derive(Clone, Debug, Default)]
pub struct ManagerOptions {
    /// Forbids the shell service and arbitrary OS processes.
    pub untrusted_env: bool,
    /// Manager-wide opt-in for sending credentials over an insecure remote transport (the
    /// library-caller counterpart to a CLI's `-allow-insecure-creds` flag).
    pub allow_insecure_creds: bool,
    /// Enables verbose dial logging for every remote.
    pub debug: bool,
}

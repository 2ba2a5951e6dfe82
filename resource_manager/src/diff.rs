// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The configuration diff the external diff producer hands the manager: `Added`, `Modified` and
//! `Removed`, each a bucket of components, services, remotes and processes.

use process_manager::ProcessConfig;
use robot_net::RemoteConfig;

use crate::config::ResourceConfig;

/// One bucket of a [`ConfigDiff`]: every resource kind a diff can mention.
#[derive(Clone, Debug, Default)]
pub struct ConfigBucket {
    pub components: Vec<ResourceConfig>,
    pub services: Vec<ResourceConfig>,
    pub remotes: Vec<RemoteConfig>,
    pub processes: Vec<ProcessConfig>,
}

impl ConfigBucket {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && self.services.is_empty()
            && self.remotes.is_empty()
            && self.processes.is_empty()
    }
}

/// The full diff between an old and a new configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfigDiff {
    pub added: ConfigBucket,
    pub modified: ConfigBucket,
    pub removed: ConfigBucket,
}

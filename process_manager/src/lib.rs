// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
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

//! The process sub-manager: owns OS child processes declared in a robot's configuration.
//!
//! Trust policy is enforced here, not by callers: [`ProcessManager::noop`] builds a sub-manager
//! that accepts no adds and performs no stops, which is what an untrusted-environment resource
//! manager installs so call sites never need an `Option` or a runtime check.

mod children;

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;

pub use crate::children::ManagedChild;

const DEFAULT_GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(10);

/// The declarative description of one OS process, as carried by a configuration diff.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub id: String,
    pub name: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub log: bool,
    pub one_shot: bool,
    pub graceful_shutdown_timeout: Duration,
}

impl ProcessConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ProcessConfig {
            id: id.into(),
            name: name.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            log: true,
            one_shot: false,
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN,
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.name);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (k, v) in &self.env {
            command.env(k, v);
        }
        command
    }
}

enum Inner {
    /// Untrusted environments could not have added a process in the first place, so stopping
    /// one is always a no-op here.
    Noop,
    Live(Mutex<HashMap<String, ManagedChild>>),
}

/// Owns every locally-started OS process for one robot configuration.
pub struct ProcessManager {
    inner: Inner,
}

impl ProcessManager {
    pub fn new() -> Self {
        ProcessManager { inner: Inner::Live(Mutex::new(HashMap::new())) }
    }

    pub fn noop() -> Self {
        ProcessManager { inner: Inner::Noop }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.inner, Inner::Noop)
    }

    /// Starts a process from its config and takes ownership of the resulting child. Returns
    /// `Ok(())` even in the noop case: the diff-application layer is responsible for rejecting
    /// processes in untrusted environments with `ErrProcessesDisabled` *before* reaching here.
    pub fn add_process_from_config(&self, config: &ProcessConfig) -> Result<(), String> {
        let Inner::Live(processes) = &self.inner else { return Ok(()) };

        let command = config.to_command();
        let child = ManagedChild::spawn(command, config.graceful_shutdown_timeout)
            .map_err(|e| format!("failed to start process `{}`: {e}", config.id))?;
        processes.lock().insert(config.id.clone(), child);
        Ok(())
    }

    /// Removes a process by ID, gracefully shutting it down. Returns `true` if a process with
    /// that ID was present.
    pub fn remove_process_by_id(&self, id: &str) -> bool {
        let Inner::Live(processes) = &self.inner else { return false };
        let Some(mut child) = processes.lock().remove(id) else { return false };
        if let Err(e) = child.graceful_shutdown_sync() {
            log::warn!("error shutting down process `{id}`: {e}");
        }
        true
    }

    /// Gracefully shuts down every owned process.
    pub fn stop(&self) {
        let Inner::Live(processes) = &self.inner else { return };
        let mut processes = processes.lock();
        for (id, mut child) in processes.drain() {
            if let Err(e) = child.graceful_shutdown_sync() {
                log::warn!("error shutting down process `{id}`: {e}");
            }
        }
    }

    pub fn process_ids(&self) -> Vec<String> {
        let Inner::Live(processes) = &self.inner else { return Vec::new() };
        processes.lock().keys().cloned().collect()
    }

    /// Moves a single process out of this manager and into `other`, transferring ownership
    /// without stopping it. Used during diff application: a process slated for removal is moved
    /// into a throwaway shadow manager so it can be stopped only after the configuration mutex's
    /// critical section has ended.
    pub fn move_process_to(&self, id: &str, other: &ProcessManager) -> bool {
        let Inner::Live(processes) = &self.inner else { return false };
        let Some(child) = processes.lock().remove(id) else { return false };
        let Inner::Live(other_processes) = &other.inner else {
            // Moving into a noop manager simply drops the handle's management; the caller in an
            // untrusted environment could never have reached this path since no process exists.
            return true;
        };
        other_processes.lock().insert(id.to_owned(), child);
        true
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_manager_accepts_no_adds_and_performs_no_stops() {
        let pm = ProcessManager::noop();
        let config = ProcessConfig::new("p1", "sleep");
        assert!(pm.add_process_from_config(&config).is_ok());
        assert!(pm.process_ids().is_empty());
        assert!(!pm.remove_process_by_id("p1"));
        pm.stop();
    }

    // `tokio::process::Command::spawn` registers the child with the current runtime's reactor
    // even though nothing here awaits it, so these need a running runtime, not just `#[test]`.
    #[tokio::test]
    async fn live_manager_starts_and_stops_a_process() {
        let pm = ProcessManager::new();
        let mut config = ProcessConfig::new("sleeper", "sleep");
        config.args = vec!["5".to_owned()];
        config.graceful_shutdown_timeout = Duration::from_millis(200);
        pm.add_process_from_config(&config).unwrap();
        assert_eq!(pm.process_ids(), vec!["sleeper".to_owned()]);
        assert!(pm.remove_process_by_id("sleeper"));
        assert!(pm.process_ids().is_empty());
    }

    #[tokio::test]
    async fn move_process_to_transfers_ownership_without_stopping() {
        let from = ProcessManager::new();
        let to = ProcessManager::new();
        let mut config = ProcessConfig::new("mover", "sleep");
        config.args = vec!["5".to_owned()];
        from.add_process_from_config(&config).unwrap();

        assert!(from.move_process_to("mover", &to));
        assert!(from.process_ids().is_empty());
        assert_eq!(to.process_ids(), vec!["mover".to_owned()]);
        to.stop();
    }
}

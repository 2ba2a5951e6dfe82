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

//! A robot resource manager: owns the live dependency graph of a robot's components, services,
//! remotes and processes, applies configuration diffs against it, and answers queries about the
//! resources currently available.
//!
//! The manager itself never parses a configuration file, never speaks the wire protocol a remote
//! robot is dialed over, and never runs a driver's own hardware-facing logic: a diff producer, an
//! RPC transport (via [`remote::RemoteDialer`]/[`remote::ClientConstructor`]) and per-API drivers
//! (via [`resource::ResourceConstructor`]) are its external collaborators. What remains is graph
//! maintenance, dial policy, process supervision and the build/reconfigure/close orchestration
//! described across this crate's modules.

mod appimage;
mod config;
mod diff;
mod errors;
mod manager;
mod remote;
mod resource;

pub use appimage::{init as init_appimage_scrub, scrub as scrub_appimage_env};
pub use config::{Attributes, ManagerOptions, ResourceConfig};
pub use diff::{ConfigBucket, ConfigDiff};
pub use errors::{BuildError, ManagerError};
pub use manager::{ReconfigureReport, ResourceManager, ResourceOutcome, Stats};
pub use remote::{ClientConstructor, RemoteDialer};
pub use resource::{Dependencies, ReconfigureOutcome, Resource, ResourceConstructor, ResourceHandle};

#[cfg(test)]
mod tests;

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

//! TLS configuration plumbing shared by anything that dials a remote robot.

pub mod tls;

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the process-wide default `rustls` crypto provider. Idempotent and cheap to call
/// from every entry point that may end up dialing a remote before any other initialization has
/// necessarily run.
pub fn initialize() -> Result<(), String> {
    let mut result = Ok(());
    INIT.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            result = Err("a different rustls crypto provider was already installed".to_owned());
        }
    });
    result
}

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

//! Remote-robot federation plumbing: the declarative config for a remote, the policy that turns
//! it (plus manager-wide options) into dial options, and the trait a connected remote robot
//! implements so its resource set can be pulled and kept in sync.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use resource_name::{Api, Name};

/// Credentials presented to a remote during dialing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    pub entity: Option<String>,
    pub payload: String,
}

impl Credentials {
    pub fn new(payload: impl Into<String>) -> Self {
        Credentials { entity: None, payload: payload.into() }
    }

    pub fn with_entity(entity: impl Into<String>, payload: impl Into<String>) -> Self {
        Credentials { entity: Some(entity.into()), payload: payload.into() }
    }
}

/// External-auth parameters, used when a remote delegates authentication to a third party.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalAuthConfig {
    pub address: String,
    pub insecure: bool,
}

/// WebRTC signaling parameters for a remote reachable only via signaling.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct WebRtcConfig {
    pub signaling_address: Option<String>,
    pub signaling_creds: Option<Credentials>,
    pub disable_trickle_ice: bool,
}

/// The declarative description of one remote robot, as carried by a configuration diff.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub name: String,
    pub address: String,
    pub insecure: bool,
    pub allow_insecure_creds: bool,
    /// PEM-encoded CA certs to trust instead of the system root store. Ignored when `insecure`
    /// is set, since an insecure dial disables certificate verification entirely.
    pub root_ca_certs: Option<Vec<u8>>,
    pub credentials: Option<Credentials>,
    pub external_auth: Option<ExternalAuthConfig>,
    pub webrtc: Option<WebRtcConfig>,
    /// A managed robot is one this process provisioned itself (as opposed to a user-declared
    /// peer); its mDNS discovery path should never carry auth.
    pub managed: bool,
}

impl RemoteConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        RemoteConfig {
            name: name.into(),
            address: address.into(),
            insecure: false,
            allow_insecure_creds: false,
            root_ca_certs: None,
            credentials: None,
            external_auth: None,
            webrtc: None,
            managed: false,
        }
    }
}

/// Whether dial-time authentication is explicit credentials or an explicit absence of them.
/// There is deliberately no third "ambient" state: a remote config without credentials must
/// clear any credentials a shared dial layer might otherwise default to, so they are never
/// leaked to a remote that didn't ask for them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Auth {
    Credentials(Credentials),
    ExplicitlyCleared,
}

/// The fully assembled set of options used to dial one remote.
#[derive(Clone, Debug)]
pub struct DialOptions {
    pub address: String,
    pub debug: bool,
    pub insecure: bool,
    pub tls_config: Arc<rustls::ClientConfig>,
    pub auth: Auth,
    pub external_auth: Option<ExternalAuthConfig>,
    pub webrtc: Option<WebRtcConfig>,
    pub strip_discovery_auth: bool,
}

#[derive(Debug, Eq, PartialEq)]
pub enum DialError {
    /// Credentials were supplied for an insecure remote without an insecure-downgrade opt-in.
    InsecureWithCredentials { remote: String },
    /// The remote's TLS policy (custom root CAs, or native trust discovery) could not be
    /// assembled into a `rustls::ClientConfig`.
    TlsConfig { remote: String, reason: String },
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialError::InsecureWithCredentials { remote } => write!(
                f,
                "remote `{remote}` is insecure and was given credentials, which would be sent \
                 in the clear; pass `-allow-insecure-creds` on the CLI, or set \
                 `Config.AllowInsecureCreds` when embedding, to downgrade explicitly",
            ),
            DialError::TlsConfig { remote, reason } => {
                write!(f, "remote `{remote}` TLS configuration could not be assembled: {reason}")
            }
        }
    }
}

impl std::error::Error for DialError {}

/// Assembles dial options for `remote` per the manager's security policy, described in full in
/// the resource manager's design: `debug` enables verbose dial logging, `Insecure` trades
/// certificate verification away (via `grpc_util::tls`'s dangerous verifier) rather than
/// skipping TLS outright, credentials given without `AllowInsecureCreds` (from either the
/// remote itself or the manager-wide `allow_insecure_creds_opt`) on an insecure transport is
/// rejected with a guidance-bearing error, and an absent credential is always made explicit so
/// it is never defaulted in from an ambient source.
pub fn dial_options(remote: &RemoteConfig, debug: bool, allow_insecure_creds_opt: bool) -> Result<DialOptions, DialError> {
    let allow_insecure_creds = remote.allow_insecure_creds || allow_insecure_creds_opt;

    if remote.insecure && remote.credentials.is_some() && !allow_insecure_creds {
        log::warn!("rejecting dial for remote `{}`: insecure transport with credentials and no downgrade opt-in", remote.name);
        return Err(DialError::InsecureWithCredentials { remote: remote.name.clone() });
    }

    let tls_config = build_tls_config(remote).map_err(|reason| {
        log::warn!("remote `{}` TLS configuration failed: {reason}", remote.name);
        DialError::TlsConfig { remote: remote.name.clone(), reason }
    })?;

    let auth = match &remote.credentials {
        Some(creds) => Auth::Credentials(creds.clone()),
        None => Auth::ExplicitlyCleared,
    };

    if debug {
        log::debug!(
            "dialing remote `{}` at `{}` (insecure={}, managed={})",
            remote.name,
            remote.address,
            remote.insecure,
            remote.managed
        );
    }

    Ok(DialOptions {
        address: remote.address.clone(),
        debug,
        insecure: remote.insecure,
        tls_config,
        auth,
        external_auth: remote.external_auth.clone(),
        webrtc: remote.webrtc.clone(),
        strip_discovery_auth: remote.managed,
    })
}

/// Turns a remote's declarative TLS policy into a real `rustls::ClientConfig`: an insecure
/// remote gets `grpc_util::tls`'s dangerous no-verify config, everything else gets either the
/// caller-supplied root CA certs or the platform's native trust store.
fn build_tls_config(remote: &RemoteConfig) -> Result<Arc<rustls::ClientConfig>, String> {
    let config = if remote.insecure {
        grpc_util::tls::Config::insecure()
    } else {
        grpc_util::tls::Config::new(remote.root_ca_certs.as_ref())?
    };
    let client_config: rustls::ClientConfig = config.try_into()?;
    Ok(Arc::new(client_config))
}

/// A single-slot wake: a remote's connection notifies this when its resource set may have
/// changed, and the resource manager's background task drains it, coalescing bursts into a
/// single complete-config pass rather than one pass per notification.
#[derive(Clone)]
pub struct ParentNotifier {
    sender: tokio::sync::watch::Sender<()>,
}

impl ParentNotifier {
    pub fn channel() -> (ParentNotifier, tokio::sync::watch::Receiver<()>) {
        let (sender, receiver) = tokio::sync::watch::channel(());
        (ParentNotifier { sender }, receiver)
    }

    pub fn notify(&self) {
        // A `watch` channel only ever holds the latest value, which is exactly the coalescing
        // behavior a burst of remote resource-set changes should get.
        let _ = self.sender.send(());
    }
}

/// A connected remote robot. Implemented by the RPC client that actually talks to the remote
/// process; the resource manager only ever sees this trait.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// The remote's full resource name set, as it currently sees it.
    async fn resource_names(&self) -> Result<Vec<Name>, String>;

    /// The RPC APIs (service contracts) the remote exposes, used for `ResourceRPCAPIs` union.
    async fn resource_rpc_apis(&self) -> Result<Vec<Api>, String>;

    /// Registers the callback the remote should invoke whenever its resource set may have
    /// changed, so the owning manager can re-run complete-config.
    fn set_parent_notifier(&self, notifier: ParentNotifier);
}

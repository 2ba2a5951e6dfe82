// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The two seams the manager needs from its external RPC collaborator: something that turns
//! assembled [`robot_net::DialOptions`] into a connected [`robot_net::RemoteConnection`], and
//! something that turns one of that remote's resource names into a local client proxy. Neither
//! is implemented here: the RPC client/server transport is an external collaborator, per the
//! resource manager's Non-goals.

use std::sync::Arc;

use async_trait::async_trait;
use robot_net::{DialOptions, RemoteConnection};

use crate::resource::ResourceHandle;
use resource_name::Name;

/// Dials a remote robot given the options the manager's policy layer assembled. Registered once
/// with the manager at construction time; in production this wraps an RPC client's connect call,
/// in tests it can be a stub that hands back an in-memory [`RemoteConnection`].
#[async_trait]
pub trait RemoteDialer: Send + Sync {
    async fn dial(&self, options: &DialOptions) -> Result<Arc<dyn RemoteConnection>, String>;
}

/// Builds a local proxy resource for one of a remote's resource names. Registered per API, the
/// same way a [`crate::resource::ResourceConstructor`] is, but keyed to "I can talk to this API
/// over a remote connection" rather than "I can build this API locally".
#[async_trait]
pub trait ClientConstructor: Send + Sync {
    async fn construct_client(
        &self,
        name: &Name,
        remote: &Arc<dyn RemoteConnection>,
    ) -> Result<ResourceHandle, String>;
}

/// What the manager tracks for one attached remote: its declarative config (kept around so a
/// later `Modified` diff entry can be compared against it) and the live connection.
#[derive(Clone)]
pub(crate) struct RemoteEntry {
    #[allow(dead_code)]
    pub config: robot_net::RemoteConfig,
    pub connection: Arc<dyn RemoteConnection>,
}

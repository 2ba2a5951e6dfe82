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

//! A small wrapper around a tokio runtime handle, used so that the resource manager's background
//! tasks (the complete-config loop, remote wake channel drains) are spawned through one shared
//! entry point rather than ad-hoc `tokio::spawn` calls scattered through the crate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

/// Executors come in two flavors:
///
/// * "borrowed": created with [`Executor::new`], wrapping a [`Handle`] the caller already owns
///   (typically the `#[tokio::main]`/`#[tokio::test]` runtime). Dropping all clones never shuts
///   down the underlying runtime.
/// * "owned": created with [`Executor::new_owned`], which builds and owns its own `Runtime`.
///   [`Executor::shutdown`] tears it down; this is the flavor a standalone binary entry point
///   constructs.
#[derive(Debug, Clone)]
pub struct Executor {
    runtime: Arc<Mutex<Option<Runtime>>>,
    handle: Handle,
}

impl Executor {
    /// Wraps the currently-entered tokio runtime handle.
    pub fn new() -> Executor {
        Executor { runtime: Arc::new(Mutex::new(None)), handle: Handle::current() }
    }

    /// Builds and owns a fresh multi-threaded runtime.
    pub fn new_owned(worker_threads: usize) -> Result<Executor, String> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start the runtime: {e}"))?;
        let handle = runtime.handle().clone();
        Ok(Executor { runtime: Arc::new(Mutex::new(Some(runtime))), handle })
    }

    /// A clone of this executor that is disconnected from this executor's shutdown: dropping it,
    /// or calling `shutdown` on it, has no effect on the owning runtime.
    pub fn to_borrowed(&self) -> Executor {
        Executor { runtime: Arc::new(Mutex::new(None)), handle: self.handle.clone() }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a future as a new task, recovering from a panicked/cancelled task via
    /// `rescue_join_error` rather than propagating a `JoinError` to the caller.
    pub fn spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
        rescue_join_error: impl FnOnce(JoinError) -> O,
    ) -> impl Future<Output = O> {
        self.native_spawn(future).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    pub fn native_spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
    ) -> JoinHandle<O> {
        self.handle.spawn(future)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Blocking shutdown of an owned runtime; a no-op for borrowed executors. Tasks that do not
    /// complete within `timeout` are leaked rather than awaited further.
    pub fn shutdown(&self, timeout: Duration) {
        let Some(runtime) = self.runtime.lock().take() else { return };
        runtime.shutdown_timeout(timeout);
    }

    pub fn is_shutdown(&self) -> bool {
        self.runtime.lock().is_none()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_runs_future_to_completion() {
        let executor = Executor::new();
        let result = executor.spawn(async { 1 + 1 }, |_| 0).await;
        assert_eq!(result, 2);
    }

    #[test]
    fn owned_executor_can_block_on_and_shutdown() {
        let executor = Executor::new_owned(2).unwrap();
        let result = executor.block_on(async { 40 + 2 });
        assert_eq!(result, 42);
        executor.shutdown(Duration::from_millis(500));
        assert!(executor.is_shutdown());
    }

    #[test]
    fn borrowed_executor_is_never_shutdown() {
        let owned = Executor::new_owned(1).unwrap();
        let borrowed = owned.to_borrowed();
        borrowed.shutdown(Duration::from_millis(10));
        assert!(borrowed.is_shutdown());
        assert!(!owned.is_shutdown());
    }
}

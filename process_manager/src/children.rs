// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time};

use nix::sys::signal;
use nix::unistd::getpgid;
use nix::unistd::Pid;
use tokio::process::{Child, Command};

const GRACEFUL_SHUTDOWN_POLL_TIME: time::Duration = time::Duration::from_millis(50);

/// A child process running in its own PGID, with a drop implementation that will kill that PGID.
pub struct ManagedChild {
    child: Child,
    graceful_shutdown_timeout: time::Duration,
    killed: AtomicBool,
}

impl ManagedChild {
    pub fn spawn(
        mut command: Command,
        graceful_shutdown_timeout: time::Duration,
    ) -> Result<Self, String> {
        // Set `kill_on_drop` to encourage `tokio` to `wait` the process via its own reaping
        // mechanism.
        command.kill_on_drop(true);

        // Put the child in its own process group as it starts, so it is safe to signal the
        // whole group later without also signaling this process.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map(|_pgid| ()).map_err(|e| {
                    std::io::Error::other(format!("could not create new pgid: {e}"))
                })
            });
        };

        let child = command
            .spawn()
            .map_err(|e| format!("error executing process: {e}"))?;
        Ok(Self { child, graceful_shutdown_timeout, killed: AtomicBool::new(false) })
    }

    fn get_pgid(&self) -> Result<Pid, String> {
        let pid = self.id().ok_or_else(|| "process had no PID".to_owned())?;
        getpgid(Some(Pid::from_raw(pid as i32)))
            .map_err(|e| format!("could not get process group id of child process: {e}"))
    }

    /// Sends a signal to the child's entire process group.
    fn signal_pg<T: Into<Option<signal::Signal>>>(&mut self, signal: T) -> Result<(), String> {
        let pgid = self.get_pgid()?;
        signal::kill(Pid::from_raw(-pgid.as_raw()), signal)
            .map_err(|e| format!("failed to signal child process group: {e}"))
    }

    fn check_child_has_exited(&mut self) -> Result<bool, String> {
        self.child.try_wait().map(|o| o.is_some()).map_err(|e| e.to_string())
    }

    /// Polls the child until it exits or `max_wait_duration` elapses. Blocks the calling thread
    /// for a bounded amount of time.
    fn wait_for_child_exit_sync(&mut self, max_wait_duration: time::Duration) -> Result<bool, String> {
        let deadline = time::Instant::now() + max_wait_duration;
        while time::Instant::now() <= deadline {
            if self.check_child_has_exited()? {
                return Ok(true);
            }
            thread::sleep(GRACEFUL_SHUTDOWN_POLL_TIME);
        }
        Ok(false)
    }

    /// Sends SIGINT and waits for the configured grace period; escalates to SIGKILL if the
    /// process has not exited by the deadline.
    pub fn graceful_shutdown_sync(&mut self) -> Result<(), String> {
        self.signal_pg(signal::Signal::SIGINT)?;
        match self.wait_for_child_exit_sync(self.graceful_shutdown_timeout) {
            Ok(true) => {
                self.killed.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(false) => {
                log::warn!("timed out waiting for graceful shutdown; sending SIGKILL instead");
                self.kill_pgid()
            }
            Err(e) => {
                log::warn!("error waiting for graceful shutdown ({e}); sending SIGKILL instead");
                self.kill_pgid()
            }
        }
    }

    fn kill_pgid(&mut self) -> Result<(), String> {
        self.signal_pg(signal::Signal::SIGKILL)?;
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Deref for ManagedChild {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.child
    }
}

impl DerefMut for ManagedChild {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if !self.killed.load(Ordering::SeqCst) {
            let _ = self.graceful_shutdown_sync();
        }
    }
}

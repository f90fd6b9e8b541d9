//! Supervised worker processes.
//!
//! Handles spawning child processes, signalling their process group, and the
//! restart rules driven by exits and heartbeat staleness.

pub mod heartbeat;
pub mod supervisor;

pub use heartbeat::{spawn_heartbeat, HeartbeatBoard};
pub use supervisor::Supervisor;

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ProcessConfig, DAEMON_ENV_VAR};

/// Default time a blocking stop waits before escalating to SIGKILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// How to launch a worker.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Executable followed by its arguments. No shell interpretation.
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
}

/// Observable lifecycle of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
    /// Interrupt sent, exit not yet observed.
    Stopping,
    /// Exited on its own; reaped by the next stop or restart.
    Exited,
}

/// Signals a stop can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Interrupt,
    Kill,
}

/// A named worker and the child currently running it.
pub struct ManagedProcess {
    name: String,
    spec: LaunchSpec,
    enabled: bool,
    sigkill: bool,
    watchdog_timeout: Option<Duration>,
    stop_grace: Duration,
    child: Option<Child>,
    shutting_down: bool,
    watchdog_seen: bool,
    restarts: u32,
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>, spec: LaunchSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            enabled: true,
            sigkill: false,
            watchdog_timeout: None,
            stop_grace: DEFAULT_STOP_GRACE,
            child: None,
            shutting_down: false,
            watchdog_seen: false,
            restarts: 0,
        }
    }

    pub fn from_config(config: &ProcessConfig, stop_grace: Duration) -> Self {
        let spec = LaunchSpec {
            command: config.command.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
        };
        Self::new(&config.name, spec)
            .with_enabled(config.enabled)
            .with_sigkill(config.sigkill)
            .with_watchdog(config.watchdog_timeout())
            .with_stop_grace(stop_grace)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Interrupt with SIGKILL instead of SIGINT.
    pub fn with_sigkill(mut self, sigkill: bool) -> Self {
        self.sigkill = sigkill;
        self
    }

    pub fn with_watchdog(mut self, timeout: Option<Duration>) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Number of restarts triggered by crashes or the watchdog.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn state(&mut self) -> ProcessState {
        let shutting_down = self.shutting_down;
        match self.child.as_mut() {
            None => ProcessState::Stopped,
            Some(child) => match child.try_wait() {
                Ok(None) if shutting_down => ProcessState::Stopping,
                Ok(None) => ProcessState::Running,
                _ => ProcessState::Exited,
            },
        }
    }

    /// Whether a child exists and has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(
            self.state(),
            ProcessState::Running | ProcessState::Stopping
        )
    }

    /// Spawn the worker unless it is already running.
    ///
    /// A pending non-blocking stop is completed first.
    pub async fn start(&mut self) -> std::io::Result<()> {
        if self.shutting_down {
            self.stop(true).await;
        }

        if self.child.is_some() {
            return Ok(());
        }

        let executable = self.spec.command.first().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Empty command for {}", self.name),
            )
        })?;
        let args = &self.spec.command[1..];

        info!(name = %self.name, executable = %executable, ?args, "Starting process");

        let mut cmd = Command::new(executable);
        cmd.args(args);

        if let Some(dir) = &self.spec.working_dir {
            if Path::new(dir).exists() {
                cmd.current_dir(dir);
            } else {
                warn!(name = %self.name, dir = %dir, "Working directory does not exist, using current directory");
            }
        }

        cmd.envs(&self.spec.env);
        cmd.env(DAEMON_ENV_VAR, &self.name);

        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            error!(name = %self.name, error = %e, "Failed to spawn process");
            e
        })?;

        info!(name = %self.name, pid = ?child.id(), "Process started");

        self.child = Some(child);
        self.watchdog_seen = false;
        self.shutting_down = false;
        Ok(())
    }

    /// Stop the worker.
    ///
    /// Sends the interrupt once. Without `block` this returns right away and
    /// the process is left in `Stopping`. With `block` it waits up to the
    /// grace period, then kills the process group and waits for the exit.
    /// Returns the exit status once the child has been reaped.
    pub async fn stop(&mut self, block: bool) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;

        if let Ok(None) = child.try_wait() {
            if !self.shutting_down {
                let signal = if self.sigkill {
                    StopSignal::Kill
                } else {
                    StopSignal::Interrupt
                };
                signal_child(&self.name, child, signal);
                self.shutting_down = true;
            }

            if !block {
                return None;
            }

            if tokio::time::timeout(self.stop_grace, child.wait())
                .await
                .is_err()
            {
                info!(name = %self.name, "Process ignored interrupt, sending SIGKILL");
                signal_child(&self.name, child, StopSignal::Kill);
                if let Err(e) = child.wait().await {
                    warn!(name = %self.name, error = %e, "Error waiting for process");
                }
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                info!(name = %self.name, status = %status, "Process is dead");
                self.child = None;
                self.shutting_down = false;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                error!(name = %self.name, error = %e, "Failed to check process status");
                None
            }
        }
    }

    /// Blocking stop followed by start.
    pub async fn restart(&mut self) -> std::io::Result<()> {
        self.restarts += 1;
        self.stop(true).await;
        self.start().await
    }

    /// Apply the restart rules.
    ///
    /// A dead child is restarted unconditionally. A live one is restarted
    /// when `last_heartbeat` is older than the watchdog timeout and a fresh
    /// heartbeat was seen since the last start. `staleness_enabled` gates
    /// only the latter rule.
    pub async fn check_watchdog(
        &mut self,
        last_heartbeat: Option<Instant>,
        staleness_enabled: bool,
    ) -> std::io::Result<()> {
        if self.child.is_none() {
            return Ok(());
        }

        if !self.is_alive() && !self.shutting_down {
            let status = self
                .child
                .as_mut()
                .and_then(|c| c.try_wait().ok().flatten());
            error!(name = %self.name, ?status, "Process died, restarting");
            return self.restart().await;
        }

        let Some(timeout) = self.watchdog_timeout else {
            return Ok(());
        };

        let fresh = last_heartbeat.is_some_and(|at| at.elapsed() <= timeout);
        if fresh {
            self.watchdog_seen = true;
        } else if self.watchdog_seen && staleness_enabled && !self.shutting_down {
            error!(name = %self.name, ?timeout, "Watchdog timeout, restarting");
            return self.restart().await;
        }
        Ok(())
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Ok(None) = child.try_wait() {
                warn!(name = %self.name, pid = ?child.id(), "Killing orphaned process on drop");
                signal_child(&self.name, child, StopSignal::Kill);
            }
        }
    }
}

/// Deliver `signal` to the child's process group.
fn signal_child(name: &str, child: &mut Child, signal: StopSignal) {
    let Some(pid) = child.id() else {
        return;
    };
    debug!(name = %name, pid, ?signal, "Signalling process group");

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Kill => Signal::SIGKILL,
        };
        if let Err(e) = killpg(Pid::from_raw(pid as i32), sig) {
            warn!(name = %name, error = %e, "Failed to signal process group");
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal;
        let _ = child.start_kill();
    }
}

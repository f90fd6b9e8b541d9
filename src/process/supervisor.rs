//! Supervision loop over a fixed set of managed processes.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info};

use super::{HeartbeatBoard, ManagedProcess, ProcessState};
use crate::config::SupervisorConfig;

/// Keeps enabled workers running and disabled ones stopped.
pub struct Supervisor {
    processes: Vec<ManagedProcess>,
    board: HeartbeatBoard,
    interval: Duration,
    staleness_enabled: bool,
}

impl Supervisor {
    pub fn new(processes: Vec<ManagedProcess>, board: HeartbeatBoard) -> Self {
        Self {
            processes,
            board,
            interval: Duration::from_millis(100),
            staleness_enabled: true,
        }
    }

    pub fn from_config(config: &SupervisorConfig, board: HeartbeatBoard) -> Self {
        let processes = config
            .processes
            .iter()
            .map(|p| ManagedProcess::from_config(p, config.stop_grace()))
            .collect();
        Self::new(processes, board).with_interval(config.interval())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enable or disable heartbeat-staleness restarts.
    pub fn with_staleness_restarts(mut self, enabled: bool) -> Self {
        self.staleness_enabled = enabled;
        self
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    pub fn process_mut(&mut self, name: &str) -> Option<&mut ManagedProcess> {
        self.processes.iter_mut().find(|p| p.name() == name)
    }

    /// One supervision pass.
    pub async fn ensure_running(&mut self) {
        for process in &mut self.processes {
            if process.enabled() {
                if let Err(e) = process.start().await {
                    error!(name = %process.name(), error = %e, "Failed to start process");
                    continue;
                }
            } else {
                process.stop(false).await;
            }

            let last = self.board.last(process.name());
            if let Err(e) = process.check_watchdog(last, self.staleness_enabled).await {
                error!(name = %process.name(), error = %e, "Failed to restart process");
            }
        }
    }

    /// Supervise until `shutdown` resolves, then stop everything.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(processes = self.processes.len(), "Supervisor started");
        tokio::pin!(shutdown);

        loop {
            self.ensure_running().await;
            debug!(status = %self.status_line(), "Supervisor pass");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.cleanup().await;
    }

    /// Interrupt every process at once, then wait for each in turn.
    pub async fn cleanup(&mut self) {
        for process in &mut self.processes {
            process.stop(false).await;
        }
        for process in &mut self.processes {
            process.stop(true).await;
        }
        info!("All processes stopped");
    }

    /// `name+` for live processes, `name-` for dead ones.
    fn status_line(&mut self) -> String {
        self.processes
            .iter_mut()
            .filter_map(|p| {
                let mark = match p.state() {
                    ProcessState::Stopped => return None,
                    ProcessState::Running | ProcessState::Stopping => '+',
                    ProcessState::Exited => '-',
                };
                Some(format!("{}{}", p.name(), mark))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

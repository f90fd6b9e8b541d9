//! Supervisor configuration types.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Supervisor loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Sleep between supervision passes, in milliseconds.
    pub interval_ms: u64,
    /// Grace period between interrupt and kill on a blocking stop.
    pub stop_grace_secs: u64,
    /// Start the relay inside the supervisor process.
    pub embed_relay: bool,
    /// Workers to keep running.
    pub processes: Vec<ProcessConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            stop_grace_secs: 5,
            embed_relay: true,
            processes: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// One supervised worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    /// Unique name; also the worker's heartbeat identity.
    pub name: String,
    /// Executable followed by its arguments. No shell interpretation.
    pub command: Vec<String>,
    /// Working directory for the spawned process.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Disabled workers are kept stopped.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interrupt with SIGKILL instead of SIGINT.
    #[serde(default)]
    pub sigkill: bool,
    /// Restart when no heartbeat arrives for this long.
    #[serde(default)]
    pub watchdog_timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl ProcessConfig {
    pub fn watchdog_timeout(&self) -> Option<Duration> {
        self.watchdog_timeout_ms.map(Duration::from_millis)
    }
}

//! Application configuration.
//!
//! Aggregates configuration from all subsystems into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod network;
mod services;
mod supervisor;

pub use network::NetworkConfig;
pub use services::{RecorderConfig, ReplayConfig, StorageConfig};
pub use supervisor::{ProcessConfig, SupervisorConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "RIGBUS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "RIGBUS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "RIGBUS_LOG";
/// Environment variable overriding `storage.log_root`.
pub const LOG_DIR_ENV_VAR: &str = "REPLAY_LOG_DIR";
/// Environment variable that, when set, disables watchdog staleness restarts.
pub const NO_WATCHDOG_ENV_VAR: &str = "NO_WATCHDOG";
/// Environment variable carrying a supervised worker's own name.
pub const DAEMON_ENV_VAR: &str = "RIGBUS_DAEMON";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay addresses and queue sizes.
    pub network: NetworkConfig,
    /// Session directory layout and shard limits.
    pub storage: StorageConfig,
    /// Record server settings.
    pub recorder: RecorderConfig,
    /// Replay server settings.
    pub replay: ReplayConfig,
    /// Supervised worker list.
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. `LOG_DIR_ENV_VAR` for the log root
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        if let Ok(log_root) = std::env::var(LOG_DIR_ENV_VAR) {
            config.storage.log_root = log_root.into();
        }
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

/// Whether watchdog staleness restarts are disabled by the environment.
pub fn watchdog_disabled() -> bool {
    std::env::var_os(NO_WATCHDOG_ENV_VAR).is_some()
}

//! Record and replay configuration types.

use std::path::PathBuf;

use serde::Deserialize;

use crate::topics::{CLOCK_SERVICE, RECORDER_SERVICE, REPLAY_SERVICE};

/// Session storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per session.
    pub log_root: PathBuf,
    /// Entries per shard before rotating.
    pub shard_max_count: u64,
    /// Bytes per shard before rotating.
    pub shard_max_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("logs"),
            shard_max_count: u64::MAX,
            shard_max_size: 100_000_000,
        }
    }
}

/// Record server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Service name; commands arrive on `/<service>/in/<command>/`.
    pub service: String,
    /// Status broadcast interval in milliseconds.
    pub status_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            service: RECORDER_SERVICE.to_string(),
            status_interval_ms: 1000,
        }
    }
}

/// Replay server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Service name; commands arrive on `/<service>/in/<command>/`.
    pub service: String,
    /// Services told to suspend live production while replay is enabled.
    pub block_list: Vec<String>,
    /// Recorded topics with these prefixes are never re-published.
    pub excluded_prefixes: Vec<String>,
    /// Topics the command loop never coalesces.
    pub no_drop_topics: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            service: REPLAY_SERVICE.to_string(),
            block_list: vec!["deepdrrd".to_string(), CLOCK_SERVICE.to_string()],
            excluded_prefixes: vec![
                format!("/{}/", RECORDER_SERVICE),
                format!("/{}/", REPLAY_SERVICE),
            ],
            no_drop_topics: Vec::new(),
        }
    }
}

//! Recording sessions.

use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use super::shard::{Result, ShardWriter};
use crate::proto::LogEntry;

/// Length of generated session ids.
pub const SESSION_ID_LEN: usize = 16;

/// Timestamp format of session directory names.
pub const SESSION_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Random session id: lowercase ASCII letters and digits.
pub fn new_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// Session id a session directory name starts with.
pub fn session_id_of(dir_name: &str) -> &str {
    dir_name.split_once("--").map_or(dir_name, |(id, _)| id)
}

/// The active session: its id, directory, and shard writer.
#[derive(Debug)]
struct ActiveSession {
    id: String,
    dir: PathBuf,
    shards: ShardWriter,
}

/// Owns at most one open session under a log root.
#[derive(Debug)]
pub struct LogRecorder {
    log_root: PathBuf,
    max_count: u64,
    max_size: u64,
    session: Option<ActiveSession>,
}

impl LogRecorder {
    pub fn new(log_root: impl Into<PathBuf>, max_count: u64, max_size: u64) -> Self {
        Self {
            log_root: log_root.into(),
            max_count,
            max_size,
            session: None,
        }
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// Seal any open session and start a new one.
    ///
    /// Returns the new session id.
    pub fn new_session(&mut self) -> Result<String> {
        self.finish();

        let id = new_session_id();
        let stamp = chrono::Local::now().format(SESSION_TIME_FORMAT);
        let name = format!("{}--{}", id, stamp);
        let dir = self.log_root.join(&name);
        std::fs::create_dir_all(&dir)?;

        let shards = ShardWriter::create(&dir, &name, self.max_count, self.max_size)?;
        info!(session = %id, dir = %dir.display(), "Recording session started");

        self.session = Some(ActiveSession {
            id: id.clone(),
            dir,
            shards,
        });
        Ok(id)
    }

    /// Seal the open session, if any.
    pub fn stop_session(&mut self) {
        self.finish();
    }

    /// Append to the open session; discarded when none is open.
    pub fn write(&mut self, entry: &LogEntry) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.shards.write(entry),
            None => Ok(()),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    fn finish(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shards.finish();
            info!(
                session = %session.id,
                entries = session.shards.total(),
                "Recording session sealed"
            );
        }
    }
}

impl Drop for LogRecorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("Recorder dropped with an open session, sealing");
            self.finish();
        }
    }
}

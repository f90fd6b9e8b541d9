//! Recorded sessions available under the log root.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use crate::proto::{LogInfo, LogList};

/// One session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Directory name, `<session id>--<timestamp>`.
    pub id: String,
    pub path: PathBuf,
    /// Modification time in whole seconds since the Unix epoch.
    pub mtime: i64,
}

/// Cached listing of session directories, oldest first.
#[derive(Debug)]
pub struct SessionCatalog {
    root: PathBuf,
    cache: Option<Vec<SessionInfo>>,
}

impl SessionCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the cached listing; the next lookup rescans.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Session directories sorted by modification time.
    pub fn sessions(&mut self) -> &[SessionInfo] {
        let root = &self.root;
        self.cache.get_or_insert_with(|| scan(root))
    }

    /// Look up a session by directory name.
    pub fn find(&mut self, id: &str) -> Option<SessionInfo> {
        self.sessions().iter().find(|s| s.id == id).cloned()
    }

    /// Fresh listing as a wire message.
    pub fn log_list(&mut self) -> LogList {
        self.invalidate();
        LogList {
            logs: self
                .sessions()
                .iter()
                .map(|s| LogInfo {
                    id: s.id.clone(),
                    mtime: s.mtime,
                })
                .collect(),
        }
    }
}

fn scan(root: &Path) -> Vec<SessionInfo> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot list log root");
            return Vec::new();
        }
    };

    let mut sessions: Vec<SessionInfo> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let meta = entry.metadata().ok()?;
            if !meta.is_dir() {
                return None;
            }
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs() as i64);
            Some(SessionInfo {
                id: entry.file_name().to_string_lossy().into_owned(),
                path,
                mtime,
            })
        })
        .collect();

    sessions.sort_by(|a, b| a.mtime.cmp(&b.mtime).then_with(|| a.id.cmp(&b.id)));
    debug!(root = %root.display(), count = sessions.len(), "Scanned sessions");
    sessions
}

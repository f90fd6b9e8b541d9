//! Sequential reader over a session's shards.
//!
//! The cursor position is `(shard_index, byte_offset)`: the shard being read
//! and how far into it. One entry of look-ahead can be held back so a seek
//! lands on the first entry at or after the target time without losing it.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::proto::LogEntry;
use crate::recorder::shard::{read_record, shard_index, Result};

/// Reader over one session directory.
#[derive(Debug)]
pub struct LogCursor {
    dir: PathBuf,
    shards: Vec<PathBuf>,
    shard_index: usize,
    byte_offset: u64,
    reader: Option<BufReader<File>>,
    pending: Option<LogEntry>,
    /// Time of the last entry handed out, or the last seek target.
    position: Option<f64>,
    previous_position: Option<f64>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl LogCursor {
    /// Open a session directory and order its shards by index.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut shards: Vec<(u64, PathBuf)> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| shard_index(&path).map(|i| (i, path)))
            .collect();
        shards.sort_by_key(|(i, _)| *i);

        debug!(dir = %dir.display(), shards = shards.len(), "Opened session");

        Ok(Self {
            dir,
            shards: shards.into_iter().map(|(_, p)| p).collect(),
            shard_index: 0,
            byte_offset: 0,
            reader: None,
            pending: None,
            position: None,
            previous_position: None,
            start_time: None,
            end_time: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Current `(shard_index, byte_offset)`.
    pub fn position(&self) -> (usize, u64) {
        (self.shard_index, self.byte_offset)
    }

    /// Time of the first entry of the first shard; 0 for an empty session.
    pub fn start_time(&mut self) -> f64 {
        if let Some(t) = self.start_time {
            return t;
        }
        let t = self
            .shards
            .first()
            .and_then(|path| first_entry_time(path))
            .unwrap_or(0.0);
        self.start_time = Some(t);
        t
    }

    /// Time of the last entry of the last shard; 0 for an empty session.
    pub fn end_time(&mut self) -> f64 {
        if let Some(t) = self.end_time {
            return t;
        }
        let t = self
            .shards
            .last()
            .and_then(|path| last_entry_time(path))
            .unwrap_or(0.0);
        self.end_time = Some(t);
        t
    }

    /// Time the cursor stands at: last entry handed out or last seek target.
    pub fn current_time(&mut self) -> f64 {
        match self.position {
            Some(t) => t,
            None => self.start_time(),
        }
    }

    /// Next entry in shard order, crossing shard boundaries.
    pub fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        self.previous_position = self.position;

        if let Some(entry) = self.pending.take() {
            self.position = Some(entry.log_mono_time);
            return Ok(Some(entry));
        }

        loop {
            if self.reader.is_none() {
                let Some(path) = self.shards.get(self.shard_index) else {
                    return Ok(None);
                };
                let mut file = File::open(path)?;
                if self.byte_offset > 0 {
                    file.seek(SeekFrom::Start(self.byte_offset))?;
                }
                self.reader = Some(BufReader::new(file));
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };

            match read_record(reader)? {
                Some((entry, consumed)) => {
                    self.byte_offset += consumed;
                    self.position = Some(entry.log_mono_time);
                    return Ok(Some(entry));
                }
                None => {
                    self.reader = None;
                    self.shard_index += 1;
                    self.byte_offset = 0;
                }
            }
        }
    }

    /// Return the entry just taken from [`next_entry`](Self::next_entry).
    pub fn push_back(&mut self, entry: LogEntry) {
        self.pending = Some(entry);
        self.position = self.previous_position;
    }

    /// Position on the first entry with time at or after `time`.
    ///
    /// Rewinds to shard 0 first when `time` is not ahead of the cursor.
    pub fn seek_time(&mut self, time: f64) -> Result<()> {
        if self.position.is_some_and(|p| time <= p) {
            self.rewind();
        }

        while let Some(entry) = self.next_entry()? {
            if entry.log_mono_time >= time {
                self.pending = Some(entry);
                break;
            }
        }

        self.position = Some(time);
        self.previous_position = Some(time);
        Ok(())
    }

    fn rewind(&mut self) {
        self.shard_index = 0;
        self.byte_offset = 0;
        self.reader = None;
        self.pending = None;
        self.position = None;
        self.previous_position = None;
    }
}

fn first_entry_time(path: &Path) -> Option<f64> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    match read_record(&mut reader) {
        Ok(entry) => entry.map(|(e, _)| e.log_mono_time),
        Err(e) => {
            warn!(shard = %path.display(), error = %e, "Cannot read first entry");
            None
        }
    }
}

fn last_entry_time(path: &Path) -> Option<f64> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    let mut last = None;
    loop {
        match read_record(&mut reader) {
            Ok(Some((entry, _))) => last = Some(entry.log_mono_time),
            Ok(None) => return last,
            Err(e) => {
                warn!(shard = %path.display(), error = %e, "Cannot read to end of shard");
                return last;
            }
        }
    }
}

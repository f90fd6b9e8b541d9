//! Shard files: append-only runs of length-prefixed `LogEntry` records.
//!
//! Record layout:
//! ```text
//! ┌─────────────┬──────────────────────────┐
//! │ len u32 (LE)│ prost-encoded LogEntry   │
//! └─────────────┴──────────────────────────┘
//! ```
//! A session's shards are named `<stem>--<n>.rlog` and ordered by `n`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message as _;
use tracing::{debug, info, warn};

use crate::proto::LogEntry;

/// File extension of shard files.
pub const SHARD_EXTENSION: &str = "rlog";

const LEN_PREFIX: usize = 4;

/// Errors reading or writing shard files.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt record: {0}")]
    Decode(#[from] prost::DecodeError),
}

pub type Result<T> = std::result::Result<T, ShardError>;

/// Path of shard `index` for a session directory and stem.
pub fn shard_path(dir: &Path, stem: &str, index: u64) -> PathBuf {
    dir.join(format!("{}--{}.{}", stem, index, SHARD_EXTENSION))
}

/// Shard index encoded in a shard file name, if it is one.
pub fn shard_index(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != SHARD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, index) = stem.rsplit_once("--")?;
    index.parse().ok()
}

/// Encode one record, length prefix included.
pub fn encode_record(entry: &LogEntry) -> Vec<u8> {
    let len = entry.encoded_len();
    let mut buf = Vec::with_capacity(LEN_PREFIX + len);
    buf.extend_from_slice(&(len as u32).to_le_bytes());
    // Vec<u8> grows as needed, encode cannot fail.
    let _ = entry.encode(&mut buf);
    buf
}

/// Read the next record.
///
/// Returns the entry and the number of bytes consumed, or `None` at end of
/// shard. A torn trailing record counts as end of shard.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<(LogEntry, u64)>> {
    let mut len_buf = [0u8; LEN_PREFIX];
    let got = read_full(reader, &mut len_buf)?;
    if got == 0 {
        return Ok(None);
    }
    if got < LEN_PREFIX {
        warn!(bytes = got, "Torn record header at end of shard");
        return Ok(None);
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    let got = read_full(reader, &mut body)?;
    if got < len {
        warn!(expected = len, got, "Torn record body at end of shard");
        return Ok(None);
    }

    let entry = LogEntry::decode(body.as_slice())?;
    Ok(Some((entry, (LEN_PREFIX + len) as u64)))
}

/// Read until `buf` is full or EOF; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================================
// Writer
// ============================================================================

/// Appends records to a numbered run of shards, rotating on count or size.
#[derive(Debug)]
pub struct ShardWriter {
    dir: PathBuf,
    stem: String,
    max_count: u64,
    max_size: u64,
    stream: Option<File>,
    current: Option<PathBuf>,
    next_shard: u64,
    count: u64,
    size: u64,
    total: u64,
}

impl ShardWriter {
    /// Create a writer and open shard 0.
    pub fn create(
        dir: impl Into<PathBuf>,
        stem: impl Into<String>,
        max_count: u64,
        max_size: u64,
    ) -> Result<Self> {
        let mut writer = Self {
            dir: dir.into(),
            stem: stem.into(),
            max_count: max_count.max(1),
            max_size: max_size.max(1),
            stream: None,
            current: None,
            next_shard: 0,
            count: 0,
            size: 0,
            total: 0,
        };
        writer.next_stream()?;
        Ok(writer)
    }

    /// Close the current shard and open the next one.
    fn next_stream(&mut self) -> Result<()> {
        self.finish();

        let path = shard_path(&self.dir, &self.stem, self.next_shard);
        self.next_shard += 1;
        self.count = 0;
        self.size = 0;

        let file = File::create(&path)?;
        info!(shard = %path.display(), total = self.total, "Writing shard");
        self.stream = Some(file);
        self.current = Some(path);
        Ok(())
    }

    /// Append one entry, rotating first when the current shard is full.
    ///
    /// A failed write abandons the current shard; the next call opens a new
    /// one.
    pub fn write(&mut self, entry: &LogEntry) -> Result<()> {
        if self.stream.is_none() || self.count >= self.max_count || self.size >= self.max_size {
            self.next_stream()?;
        }

        let record = encode_record(entry);
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        if let Err(e) = stream.write_all(&record).and_then(|_| stream.flush()) {
            self.stream = None;
            return Err(e.into());
        }

        self.count += 1;
        self.size += record.len() as u64;
        self.total += 1;
        Ok(())
    }

    /// Close the current shard.
    pub fn finish(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.sync_data() {
                warn!(error = %e, "Failed to sync shard on close");
            }
            if let Some(path) = &self.current {
                debug!(shard = %path.display(), entries = self.count, bytes = self.size, "Shard closed");
            }
        }
    }

    /// Entries written across all shards.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Shard currently being written.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

//! Append-only session log file
//!
//! [`PersistentSink`] owns one `sensor_data_<id>.csv` file. It writes the
//! header exactly once per physical file (only when the file is empty at
//! open time), appends batches, and forces each batch to durable storage.
//!
//! # Failure handling
//!
//! When a write fails the sink marks itself uninitialized, re-resolves the
//! path, reopens (or recreates) the file and retries the batch once. Before
//! retrying, anything past the last length known to be committed is
//! truncated so a partially written batch is not duplicated. If the
//! reinitialization or the retry fails the error is surfaced; the caller
//! still holds the rows.
//!
//! File access goes through the [`LogOpener`] / [`LogFile`] traits so tests
//! can inject failing storage.

use crate::config::{ensure_dir, session_file_name};
use crate::error::{RecorderError, Result};
use crate::storage::row::HEADER;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open, append-only log file
pub trait LogFile: Send {
    /// Current size in bytes
    fn size(&self) -> io::Result<u64>;

    /// Append bytes at the end of the file
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Force appended bytes to durable storage
    fn sync(&mut self) -> io::Result<()>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Read `len` bytes starting at `offset`
    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

/// Opens (creating if missing) log files in append mode
pub trait LogOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn LogFile>>;
}

/// Log file on the local filesystem
#[derive(Debug)]
pub struct FsLogFile {
    file: File,
}

impl LogFile for FsLogFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Opener for [`FsLogFile`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLogOpener;

impl LogOpener for FsLogOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn LogFile>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Box::new(FsLogFile { file }))
    }
}

/// Bytes scanned per step when looking for the last complete line
const TAIL_CHUNK: u64 = 4096;

/// Length of the file up to and including its last newline
fn complete_len(file: &mut dyn LogFile, size: u64) -> io::Result<u64> {
    let mut end = size;
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let chunk = file.read_at(start, (end - start) as usize)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// How a batch reached the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written on the first attempt
    Written,
    /// Written after the sink was reinitialized
    Recovered,
}

/// Append-only log keyed by session id
pub struct PersistentSink {
    opener: Arc<dyn LogOpener>,
    dir: PathBuf,
    session_id: String,
    path: PathBuf,
    file: Option<Box<dyn LogFile>>,
    committed_len: u64,
    created: bool,
    reinitializations: u64,
}

impl std::fmt::Debug for PersistentSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSink")
            .field("path", &self.path)
            .field("initialized", &self.is_initialized())
            .field("committed_len", &self.committed_len)
            .finish()
    }
}

impl PersistentSink {
    /// Open the session file under `dir` on the local filesystem
    pub fn open(dir: impl Into<PathBuf>, session_id: &str) -> Result<Self> {
        Self::open_with(Arc::new(FsLogOpener), dir, session_id)
    }

    /// Open the session file through a custom opener
    pub fn open_with(
        opener: Arc<dyn LogOpener>,
        dir: impl Into<PathBuf>,
        session_id: &str,
    ) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(session_file_name(session_id));
        let mut sink = Self {
            opener,
            dir,
            session_id: session_id.to_string(),
            path,
            file: None,
            committed_len: 0,
            created: false,
            reinitializations: 0,
        };
        sink.initialize().map_err(|e| {
            RecorderError::Initialization(format!(
                "Failed to initialize {}: {}",
                sink.path.display(),
                e
            ))
        })?;
        Ok(sink)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session this sink belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether a file is open and header-initialized
    pub fn is_initialized(&self) -> bool {
        self.file.is_some()
    }

    /// Whether the most recent open found an empty file and wrote the header
    pub fn created_file(&self) -> bool {
        self.created
    }

    /// Bytes known to be durably written
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Number of times the sink had to reopen its file
    pub fn reinitializations(&self) -> u64 {
        self.reinitializations
    }

    fn initialize(&mut self) -> Result<()> {
        ensure_dir(&self.dir)?;
        self.path = self.dir.join(session_file_name(&self.session_id));

        let mut file = self.opener.open(&self.path)?;
        let mut size = file.size()?;

        // A teardown in the middle of an append leaves a partial last line
        if size > 0 {
            let complete = complete_len(file.as_mut(), size)?;
            if complete < size {
                tracing::warn!(
                    path = %self.path.display(),
                    torn_bytes = size - complete,
                    "Truncating partial row left by an interrupted write"
                );
                file.truncate(complete)?;
                file.sync()?;
                size = complete;
            }
        }

        self.created = size == 0;
        if self.created {
            file.append(HEADER.as_bytes())?;
            file.sync()?;
        }
        self.committed_len = file.size()?;
        self.file = Some(file);

        tracing::info!(
            path = %self.path.display(),
            new_file = self.created,
            "Session file initialized"
        );
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<()> {
        self.file = None;
        self.reinitializations += 1;

        ensure_dir(&self.dir)?;
        self.path = self.dir.join(session_file_name(&self.session_id));
        let mut file = self.opener.open(&self.path)?;
        let size = file.size()?;

        if size == 0 {
            // File vanished: recreate it with a header
            file.append(HEADER.as_bytes())?;
            file.sync()?;
            self.created = true;
        } else if size > self.committed_len && self.committed_len > 0 {
            tracing::warn!(
                path = %self.path.display(),
                torn_bytes = size - self.committed_len,
                "Truncating partially written batch"
            );
            file.truncate(self.committed_len)?;
            file.sync()?;
        }
        self.committed_len = file.size()?;
        self.file = Some(file);
        Ok(())
    }

    fn try_write(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RecorderError::SinkWrite("sink is not initialized".into()))?;
        file.append(bytes)?;
        file.sync()?;
        self.committed_len += bytes.len() as u64;
        Ok(())
    }

    /// Append a batch and force it to durable storage
    ///
    /// On failure the sink reinitializes once and retries; if that also
    /// fails the sink stays uninitialized and the error is returned.
    pub fn write_batch(&mut self, batch: &str) -> Result<WriteOutcome> {
        if batch.is_empty() {
            return Ok(WriteOutcome::Written);
        }

        let first_error = if self.is_initialized() {
            match self.try_write(batch.as_bytes()) {
                Ok(()) => return Ok(WriteOutcome::Written),
                Err(e) => e,
            }
        } else {
            RecorderError::SinkWrite("sink was left uninitialized".into())
        };

        tracing::warn!(
            path = %self.path.display(),
            error = %first_error,
            "Write failed, reinitializing sink"
        );
        self.file = None;

        if let Err(e) = self.reinitialize() {
            self.file = None;
            return Err(RecorderError::SinkWrite(format!(
                "write failed ({}) and reinitialization failed ({})",
                first_error, e
            )));
        }

        match self.try_write(batch.as_bytes()) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Sink recovered after reinitialization");
                Ok(WriteOutcome::Recovered)
            }
            Err(e) => {
                self.file = None;
                Err(RecorderError::SinkWrite(format!(
                    "write failed again after reinitialization: {}",
                    e
                )))
            }
        }
    }

    /// Sync and release the file handle
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.sync()?;
            tracing::debug!(path = %self.path.display(), "Session file closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_new_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PersistentSink::open(dir.path(), "abc").unwrap();
        assert!(sink.created_file());
        assert!(sink.is_initialized());
        assert_eq!(sink.path(), dir.path().join("sensor_data_abc.csv"));

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, HEADER);
        assert_eq!(sink.committed_len(), HEADER.len() as u64);
    }

    #[test]
    fn test_reopen_appends_without_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = PersistentSink::open(dir.path(), "abc").unwrap();
            sink.write_batch("1.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n").unwrap();
            sink.close().unwrap();
        }

        let mut sink = PersistentSink::open(dir.path(), "abc").unwrap();
        assert!(!sink.created_file());
        sink.write_batch("2.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n").unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.matches("Timestamp,").count(), 1);
        assert_eq!(line_count(sink.path()), 3);
    }

    #[test]
    fn test_reopen_drops_partial_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_data_torn.csv");
        std::fs::write(
            &path,
            format!("{}1.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n2.000,0.0", HEADER),
        )
        .unwrap();

        let mut sink = PersistentSink::open(dir.path(), "torn").unwrap();
        assert!(!sink.created_file());
        sink.write_batch("3.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n").unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().skip(1).all(|l| l.split(',').count() == 9));
        assert!(content.ends_with("3.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n"));
    }

    #[test]
    fn test_torn_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_data_head.csv");
        std::fs::write(&path, &HEADER[..20]).unwrap();

        let sink = PersistentSink::open(dir.path(), "head").unwrap();
        assert!(sink.created_file());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), HEADER);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let sink = PersistentSink::open(&nested, "s1").unwrap();
        assert!(sink.path().exists());
    }

    #[test]
    fn test_unusable_directory_is_initialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();

        let err = PersistentSink::open(&blocker, "s1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InitFailure);
    }

    #[test]
    fn test_recreates_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PersistentSink::open(dir.path(), "gone").unwrap();
        sink.write_batch("1.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n").unwrap();

        // Dropping the handle forces the reinitialization path
        sink.file = None;
        std::fs::remove_file(sink.path()).unwrap();

        let outcome = sink.write_batch("2.000,0.00,0.00,0.00,0.00,0.00,0.00,0.00,0\n").unwrap();
        assert_eq!(outcome, WriteOutcome::Recovered);
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert!(content.starts_with(HEADER));
        assert_eq!(line_count(sink.path()), 2);
    }
}

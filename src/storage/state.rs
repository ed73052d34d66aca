//! Durable record of the active session
//!
//! The record is a small JSON document (`session_state.json`) holding the
//! session id, its original start time and the path of its log file. It is
//! written only after the log file is open and header-initialized, and it is
//! removed only after a successful stop. A process that is relaunched
//! without a session id reads it back to resume the same session.
//!
//! Writes go to a sibling temp file that is synced and then renamed over
//! the record, so a crash mid-write leaves either the old or the new record.

use crate::error::{RecorderError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What is persisted about the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// Session start, milliseconds since the Unix epoch
    pub start_time_millis: i64,
    pub file_path: PathBuf,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, started_at: DateTime<Utc>, file_path: PathBuf) -> Self {
        Self {
            session_id: session_id.into(),
            start_time_millis: started_at.timestamp_millis(),
            file_path,
        }
    }

    /// Start time as a timestamp; `None` if the stored value is out of range
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start_time_millis).single()
    }
}

/// File-backed store for the [`SessionRecord`]
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    path: PathBuf,
}

impl SessionStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Durably record `record`, replacing any previous one
    pub fn persist(&self, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(record).map_err(|e| {
            RecorderError::Serialization(format!("Failed to serialize session record: {}", e))
        })?;

        let tmp_path = self.tmp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            session = %record.session_id,
            "Persisted session record"
        );
        Ok(())
    }

    /// The last persisted record, if any
    ///
    /// A record that cannot be parsed is reported as absent.
    pub fn load(&self) -> Result<Option<SessionRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<SessionRecord>(&content) {
            Ok(record) if !record.session_id.is_empty() => {
                tracing::info!(
                    path = %self.path.display(),
                    session = %record.session_id,
                    "Loaded session record"
                );
                Ok(Some(record))
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Session record has an empty id, ignoring");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to parse session record, ignoring"
                );
                Ok(None)
            }
        }
    }

    /// Remove the record; a missing record is not an error
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Cleared session record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

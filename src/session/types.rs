//! Session data types

use crate::error::{ErrorKind, RecorderError, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle state of the recorder
///
/// ```text
/// Idle -> Initializing -> Recording -> Stopping -> Idle
///              |
///              +-> Failed -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No active session
    #[default]
    Idle,
    /// Opening the session file and persisting the session record
    Initializing,
    /// Sampling and writing rows
    Recording,
    /// Draining the buffer; a stop that timed out stays here
    Stopping,
    /// Setup or a write failed; resources are being released
    Failed,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// A session exists (recording or still draining)
    pub fn has_session(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Stopping)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Initializing => "Initializing",
            SessionState::Recording => "Recording",
            SessionState::Stopping => "Stopping",
            SessionState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Start command from the control surface
///
/// A missing session id means the host relaunched the process without
/// telling it which session to record; the recorder then resumes the
/// persisted session or refuses to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub session_id: Option<String>,
    pub sampling_rate_hz: u32,
}

impl StartRequest {
    /// Start (or reopen) a named session
    pub fn new(session_id: impl Into<String>, sampling_rate_hz: u32) -> Self {
        Self {
            session_id: Some(session_id.into()),
            sampling_rate_hz,
        }
    }

    /// Resume whatever session was persisted
    pub fn recover(sampling_rate_hz: u32) -> Self {
        Self {
            session_id: None,
            sampling_rate_hz,
        }
    }
}

/// Check that a session id is usable as part of a file name
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RecorderError::InvalidSession("session id is empty".into()));
    }
    if id == "." || id == ".." {
        return Err(RecorderError::InvalidSession(format!(
            "session id '{}' is reserved",
            id
        )));
    }
    if id.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(RecorderError::InvalidSession(format!(
            "session id '{}' contains a path separator or NUL",
            id.escape_debug()
        )));
    }
    Ok(())
}

/// Identity of the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    /// Original start time, kept across recovery
    pub started_at: DateTime<Utc>,
    pub file_path: PathBuf,
    /// Opened by the recovery protocol rather than an explicit start
    pub resumed: bool,
    pub sampling_rate_hz: u32,
}

/// Result of a successful start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new or reopened session is recording
    Started(SessionInfo),
    /// The persisted session was resumed
    Resumed(SessionInfo),
    /// The same session was already recording; only the power lease was re-asserted
    AlreadyRecording(SessionInfo),
}

impl StartOutcome {
    pub fn info(&self) -> &SessionInfo {
        match self {
            StartOutcome::Started(info)
            | StartOutcome::Resumed(info)
            | StartOutcome::AlreadyRecording(info) => info,
        }
    }
}

/// Result of a successful stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every row is on disk and the session file is closed
    Stopped {
        session_id: String,
        file_path: PathBuf,
        rows_written: u64,
    },
    /// There was nothing to stop
    NotRecording,
}

/// A failure reported through the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RecorderError> for FaultReport {
    fn from(e: &RecorderError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Notification sent to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// Lifecycle transition
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A batch reached the session file
    Flushed {
        session_id: String,
        rows: usize,
        total_rows_written: u64,
        recovered: bool,
    },
    /// A rate measurement window closed
    RateAdjusted {
        achieved_rate_hz: f64,
        interval: Duration,
        adjusted: bool,
    },
    /// A failure surfaced by the recorder
    Fault(FaultReport),
    /// A session finished cleanly
    Stopped {
        session_id: String,
        rows_written: u64,
    },
}

/// Non-blocking fan-out of recorder events
///
/// Every subscriber gets its own bounded queue that starts empty, so a late
/// subscriber sees live events only. Sends never block the sampling path:
/// when a subscriber's queue is full its copy of the event is dropped and
/// counted. Subscribers whose receiver is gone are pruned on the next emit.
#[derive(Debug, Clone)]
pub struct EventBus {
    capacity: usize,
    subscribers: Arc<Mutex<Vec<Sender<RecorderEvent>>>>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Arc::default(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<RecorderEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, event: RecorderEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// New receiver for events emitted from now on
    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.lock().push(tx);
        rx
    }

    /// Live subscribers
    pub fn subscribers(&self) -> usize {
        self.lock().len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

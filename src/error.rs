//! Error handling for the IMU recorder
//!
//! This module defines the recorder error type, the stable [`ErrorKind`]
//! reported through the control surface, and a Result alias for use
//! throughout the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for recorder operations
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The start request carried an unusable session id or rate
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Storage location unavailable or the session file could not be created
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// A write kept failing after the sink was reinitialized
    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    /// Process was relaunched without a session id and nothing was persisted
    #[error("Recovery failed: {0}")]
    RecoveryFailure(String),

    /// Start requested for a different session while one is recording
    #[error("Session '{active}' is already recording, refusing to start '{requested}'")]
    DuplicateSession { active: String, requested: String },

    /// The final flush did not complete within the bounded wait
    #[error("Incomplete flush on stop: {0}")]
    IncompleteFlush(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RecorderError>,
    },
}

/// Stable error classification reported to the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidSession,
    InitFailure,
    RecoveryFailure,
    DuplicateSession,
    IncompleteFlush,
    IoError,
    ConfigError,
    Internal,
}

impl ErrorKind {
    /// Stable code string, suitable for crossing a process boundary
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSession => "INVALID_SESSION",
            ErrorKind::InitFailure => "INIT_FAILURE",
            ErrorKind::RecoveryFailure => "RECOVERY_FAILURE",
            ErrorKind::DuplicateSession => "DUPLICATE_SESSION",
            ErrorKind::IncompleteFlush => "INCOMPLETE_FLUSH",
            ErrorKind::IoError => "IO_ERROR",
            ErrorKind::ConfigError => "CONFIG_ERROR",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl RecorderError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RecorderError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable kind of this error; context wrappers report their source's kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecorderError::InvalidSession(_) => ErrorKind::InvalidSession,
            RecorderError::Initialization(_) => ErrorKind::InitFailure,
            RecorderError::SinkWrite(_) | RecorderError::Io(_) => ErrorKind::IoError,
            RecorderError::RecoveryFailure(_) => ErrorKind::RecoveryFailure,
            RecorderError::DuplicateSession { .. } => ErrorKind::DuplicateSession,
            RecorderError::IncompleteFlush(_) => ErrorKind::IncompleteFlush,
            RecorderError::Config(_) | RecorderError::Serialization(_) => ErrorKind::ConfigError,
            RecorderError::Channel(_) | RecorderError::Timeout(_) => ErrorKind::Internal,
            RecorderError::WithContext { source, .. } => source.kind(),
        }
    }
}

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RecorderError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RecorderError::Io(e).with_context(f()))
    }
}

//! Configuration module for the IMU recorder
//!
//! This module handles recorder configuration including:
//! - Where session logs and the session state record live
//! - Sampling rate, buffer capacity and stop timeout
//! - Rate controller tuning (see [`settings`])
//!
//! # App Data Location
//!
//! Session files are stored in the platform-appropriate location unless
//! `data_dir` is set explicitly:
//! - **Linux**: `~/.local/share/org.openmetabolics.imu-recorder/`
//! - **macOS**: `~/Library/Application Support/org.openmetabolics.imu-recorder/`
//! - **Windows**: `%APPDATA%\org.openmetabolics.imu-recorder\`
//!
//! # Files
//!
//! - `sensor_data_<session id>.csv` - One append-only log per session
//! - `session_state.json` - Record of the active session, used for recovery
//!
//! # Example
//!
//! ```ignore
//! use imu_recorder::config::RecorderConfig;
//!
//! let config = RecorderConfig::load_or_default("recorder.toml");
//! let dir = config.resolve_data_dir()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "org.openmetabolics.imu-recorder";

/// Session state filename
pub const SESSION_STATE_FILE: &str = "session_state.json";

/// Default sampling rate in Hz
pub const DEFAULT_SAMPLING_RATE_HZ: u32 = 50;

/// Rows held in memory before a synchronous flush (four seconds at 50 Hz)
pub const DEFAULT_BUFFER_CAPACITY: usize = 200;

/// Default bounded wait for a stop to finish flushing
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of the event queue
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1_024;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure a directory exists, creating it if needed
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            RecorderError::Initialization(format!(
                "Failed to create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Name of the log file backing a session
pub fn session_file_name(session_id: &str) -> String {
    format!("sensor_data_{}.csv", session_id)
}

// ==================== Recorder Config ====================

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Sampling rate used when a caller does not specify one (Hz)
    pub target_rate_hz: u32,

    /// Rows buffered before an automatic flush
    pub buffer_capacity: usize,

    /// Directory for session files; the platform data dir when unset
    pub data_dir: Option<PathBuf>,

    /// File name of the session state record inside the data dir
    pub state_file: String,

    /// Bounded wait for stop to drain the buffer (milliseconds)
    pub stop_timeout_ms: u64,

    /// What to do when a different session is started while recording
    pub duplicate_policy: DuplicatePolicy,

    /// Capacity of each subscriber's event queue
    pub event_queue_capacity: usize,

    /// Rate controller tuning
    pub rate_control: RateControlSettings,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            data_dir: None,
            state_file: SESSION_STATE_FILE.to_string(),
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            duplicate_policy: DuplicatePolicy::default(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            rate_control: RateControlSettings::default(),
        }
    }
}

impl RecorderConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration rooted at an explicit data directory
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load recorder config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| RecorderError::Config(format!("Failed to write config: {}", e)))
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.target_rate_hz == 0 {
            return Err(RecorderError::Config("target_rate_hz must be positive".into()));
        }
        if self.buffer_capacity == 0 {
            return Err(RecorderError::Config("buffer_capacity must be positive".into()));
        }
        if self.stop_timeout_ms == 0 {
            return Err(RecorderError::Config("stop_timeout_ms must be positive".into()));
        }
        if self.state_file.is_empty() {
            return Err(RecorderError::Config("state_file must not be empty".into()));
        }
        self.rate_control.validate()
    }

    /// Resolve the data directory without creating it
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => app_data_dir().ok_or_else(|| {
                RecorderError::Initialization("Could not determine app data directory".into())
            }),
        }
    }

    /// Path of the session state record
    pub fn state_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(&self.state_file))
    }

    /// Bounded wait applied by stop
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

//! Runtime tuning for sampling and session handling
//!
//! # Main Types
//!
//! - [`RateControlSettings`] - Window, deadband, gain and clamp of the rate controller
//! - [`DuplicatePolicy`] - How a start for a different session is handled while recording

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning of the damped proportional rate controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateControlSettings {
    /// Length of one measurement window in milliseconds
    pub window_ms: u64,

    /// Relative rate error tolerated without adjustment
    pub deadband: f64,

    /// Fraction of the relative error applied per adjustment
    pub gain: f64,

    /// Lower interval bound as a fraction of the nominal interval
    pub min_interval_factor: f64,

    /// Upper interval bound as a fraction of the nominal interval
    pub max_interval_factor: f64,
}

impl Default for RateControlSettings {
    fn default() -> Self {
        Self {
            window_ms: 1_000,
            deadband: 0.10,
            gain: 0.10,
            min_interval_factor: 0.75,
            max_interval_factor: 1.25,
        }
    }
}

impl RateControlSettings {
    /// Measurement window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject settings the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(RecorderError::Config("rate_control.window_ms must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.deadband) {
            return Err(RecorderError::Config("rate_control.deadband must be in [0, 1)".into()));
        }
        if !(self.gain > 0.0 && self.gain <= 1.0) {
            return Err(RecorderError::Config("rate_control.gain must be in (0, 1]".into()));
        }
        if !(self.min_interval_factor > 0.0
            && self.min_interval_factor <= 1.0
            && self.max_interval_factor >= 1.0)
        {
            return Err(RecorderError::Config(
                "rate_control interval factors must bracket 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Policy for a start request naming a different session while one is recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the new request and keep the active session
    #[default]
    Reject,
    /// Stop the active session cleanly, then start the new one
    Restart,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Reject => write!(f, "reject"),
            DuplicatePolicy::Restart => write!(f, "restart"),
        }
    }
}

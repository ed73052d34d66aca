//! Core data types for the IMU recorder
//!
//! This module contains the fundamental data structures shared by the
//! sampling, storage and session layers.
//!
//! # Main Types
//!
//! - [`SensorChannel`] - The two IMU channels that are sampled
//! - [`Sample`] - One combined accelerometer + gyroscope reading with its derived norm
//! - [`RecordingStats`] - Counters describing the active (or last) recording

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Zero vector reported when no session is active
pub const ZERO_AXES: [f64; 6] = [0.0; 6];

/// An IMU channel that delivers three-axis readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorChannel {
    /// Linear acceleration (m/s²)
    Accelerometer,
    /// Angular rate (rad/s)
    Gyroscope,
}

impl SensorChannel {
    /// Display name for the channel
    pub fn display_name(&self) -> &'static str {
        match self {
            SensorChannel::Accelerometer => "Accelerometer",
            SensorChannel::Gyroscope => "Gyroscope",
        }
    }
}

/// One combined reading of both channels at a point in time
///
/// Produced once per scheduler tick and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Wall-clock time in seconds since the Unix epoch
    pub timestamp: f64,
    /// Acceleration [x, y, z]
    pub accel: [f32; 3],
    /// Angular rate [x, y, z]
    pub gyro: [f32; 3],
    /// L2 norm of the angular-rate vector
    pub gyro_norm: f32,
    /// Neither channel delivered a new reading since the previous tick
    pub stale: bool,
}

impl Sample {
    /// Create a sample, deriving the gyroscope norm
    pub fn new(timestamp: f64, accel: [f32; 3], gyro: [f32; 3]) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
            gyro_norm: l2_norm(&gyro),
            stale: false,
        }
    }

    /// Mark the sample as a replay of already-consumed readings
    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    /// The six axes as `(ax, ay, az, gx, gy, gz)`
    pub fn axes(&self) -> [f64; 6] {
        [
            self.accel[0] as f64,
            self.accel[1] as f64,
            self.accel[2] as f64,
            self.gyro[0] as f64,
            self.gyro[1] as f64,
            self.gyro[2] as f64,
        ]
    }
}

/// Euclidean length of a three-axis vector
pub fn l2_norm(v: &[f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Recording statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Samples produced by the scheduler
    pub samples_produced: u64,
    /// Rows durably written to the session file
    pub rows_written: u64,
    /// Rows currently held in the write buffer
    pub rows_buffered: usize,
    /// Number of completed flushes
    pub flushes: u64,
    /// Write failures recovered by reinitializing the sink
    pub recovered_write_failures: u64,
    /// Samples that repeated already-consumed readings
    pub stale_samples: u64,
    /// Events dropped because the event queue was full
    pub dropped_events: u64,
    /// Scheduler interval currently in use
    pub current_interval: Duration,
    /// Achieved sampling rate over the last measurement window (Hz)
    pub achieved_rate_hz: f64,
}

impl RecordingStats {
    /// Every produced sample is either on disk or still buffered
    pub fn rows_accounted(&self) -> bool {
        self.rows_written + self.rows_buffered as u64 == self.samples_produced
    }
}

//! Simulated IMU driver
//!
//! Generates accelerometer and gyroscope events on a background thread and
//! pushes them into a [`SensorFeed`], standing in for real hardware when
//! running the recorder on a development machine.
//!
//! # Waveform Patterns
//!
//! - [`WaveformPattern::Constant`] - Fixed value
//! - [`WaveformPattern::Sine`] - Sinusoid with frequency, amplitude and offset
//! - [`WaveformPattern::Sawtooth`] - Linear ramp that resets every period
//! - [`WaveformPattern::Square`] - Alternates between `+amplitude` and `-amplitude`
//! - [`WaveformPattern::Triangle`] - Triangle wave
//!
//! # Example
//!
//! ```ignore
//! let hub = SensorHub::new();
//! let mut imu = SimulatedImu::new(100).with_gyro_rate_hz(25);
//! imu.start(hub.feed())?;
//! // ... record ...
//! imu.stop();
//! ```

use crate::error::{RecorderError, Result};
use crate::sensor::SensorFeed;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Pattern for generating one axis of simulated data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveformPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
    /// Triangle wave
    Triangle { period: f64, amplitude: f64 },
}

impl Default for WaveformPattern {
    fn default() -> Self {
        WaveformPattern::Sine {
            frequency: 1.0,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

impl WaveformPattern {
    /// Value of the waveform at `elapsed_secs`
    pub fn value_at(&self, elapsed_secs: f64) -> f64 {
        match *self {
            WaveformPattern::Constant(v) => v,
            WaveformPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
            WaveformPattern::Sawtooth { period, amplitude } => {
                let t = elapsed_secs % period;
                amplitude * (t / period)
            }
            WaveformPattern::Square { period, amplitude } => {
                let t = elapsed_secs % period;
                if t < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            WaveformPattern::Triangle { period, amplitude } => {
                let t = elapsed_secs % period;
                let half = period / 2.0;
                if t < half {
                    amplitude * (2.0 * t / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (t - half) / half)
                }
            }
        }
    }
}

/// Evaluate three per-axis patterns
fn sample_axes(patterns: &[WaveformPattern; 3], elapsed_secs: f64) -> [f32; 3] {
    [
        patterns[0].value_at(elapsed_secs) as f32,
        patterns[1].value_at(elapsed_secs) as f32,
        patterns[2].value_at(elapsed_secs) as f32,
    ]
}

/// Background thread that emits simulated IMU events
#[derive(Debug)]
pub struct SimulatedImu {
    accel_rate_hz: u32,
    gyro_rate_hz: u32,
    accel_patterns: [WaveformPattern; 3],
    gyro_patterns: [WaveformPattern; 3],
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedImu {
    /// Driver delivering both channels at `rate_hz`, device at rest with slight sway
    pub fn new(rate_hz: u32) -> Self {
        Self {
            accel_rate_hz: rate_hz,
            gyro_rate_hz: rate_hz,
            accel_patterns: [
                WaveformPattern::Sine {
                    frequency: 0.5,
                    amplitude: 0.3,
                    offset: 0.0,
                },
                WaveformPattern::Constant(0.0),
                WaveformPattern::Constant(9.81),
            ],
            gyro_patterns: [
                WaveformPattern::Triangle {
                    period: 2.0,
                    amplitude: 0.2,
                },
                WaveformPattern::Sine {
                    frequency: 1.0,
                    amplitude: 0.1,
                    offset: 0.0,
                },
                WaveformPattern::Constant(0.0),
            ],
            stop_tx: None,
            handle: None,
        }
    }

    /// Deliver gyroscope events at a different rate than the accelerometer
    pub fn with_gyro_rate_hz(mut self, rate_hz: u32) -> Self {
        self.gyro_rate_hz = rate_hz;
        self
    }

    /// Replace the accelerometer waveforms
    pub fn with_accel_patterns(mut self, patterns: [WaveformPattern; 3]) -> Self {
        self.accel_patterns = patterns;
        self
    }

    /// Replace the gyroscope waveforms
    pub fn with_gyro_patterns(mut self, patterns: [WaveformPattern; 3]) -> Self {
        self.gyro_patterns = patterns;
        self
    }

    /// Whether the delivery thread is running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start delivering events into `feed`
    pub fn start(&mut self, feed: SensorFeed) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.accel_rate_hz == 0 || self.gyro_rate_hz == 0 {
            return Err(RecorderError::Config(
                "simulated sensor rates must be positive".into(),
            ));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let accel_period = Duration::from_secs_f64(1.0 / self.accel_rate_hz as f64);
        let gyro_period = Duration::from_secs_f64(1.0 / self.gyro_rate_hz as f64);
        let accel_patterns = self.accel_patterns;
        let gyro_patterns = self.gyro_patterns;

        let handle = std::thread::Builder::new()
            .name("imu-sim".into())
            .spawn(move || {
                let start = Instant::now();
                let mut next_accel = start;
                let mut next_gyro = start;
                loop {
                    let now = Instant::now();
                    let elapsed = now.duration_since(start).as_secs_f64();
                    if now >= next_accel {
                        feed.accelerometer(sample_axes(&accel_patterns, elapsed));
                        next_accel += accel_period;
                    }
                    if now >= next_gyro {
                        feed.gyroscope(sample_axes(&gyro_patterns, elapsed));
                        next_gyro += gyro_period;
                    }

                    let wake = next_accel.min(next_gyro);
                    let wait = wake.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Simulated IMU stopped");
            })
            .map_err(|e| RecorderError::Initialization(format!("Failed to spawn simulated IMU: {}", e)))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        tracing::info!(
            accel_hz = self.accel_rate_hz,
            gyro_hz = self.gyro_rate_hz,
            "Simulated IMU started"
        );
        Ok(())
    }

    /// Stop the delivery thread; repeated calls are no-ops
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedImu {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorHub, SensorSource};

    #[test]
    fn test_waveform_values() {
        assert_eq!(WaveformPattern::Constant(2.5).value_at(10.0), 2.5);

        let square = WaveformPattern::Square {
            period: 1.0,
            amplitude: 3.0,
        };
        assert_eq!(square.value_at(0.25), 3.0);
        assert_eq!(square.value_at(0.75), -3.0);

        let triangle = WaveformPattern::Triangle {
            period: 2.0,
            amplitude: 1.0,
        };
        assert!((triangle.value_at(0.0) + 1.0).abs() < 1e-9);
        assert!((triangle.value_at(1.0) - 1.0).abs() < 1e-9);

        let saw = WaveformPattern::Sawtooth {
            period: 2.0,
            amplitude: 4.0,
        };
        assert!((saw.value_at(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_simulated_imu_delivers() {
        let hub = SensorHub::new();
        let mut imu = SimulatedImu::new(200).with_gyro_rate_hz(100);
        imu.start(hub.feed()).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        imu.stop();
        assert!(!imu.is_running());

        let snap = hub.snapshot();
        assert!(snap.accelerometer.sequence > 0);
        assert!(snap.gyroscope.sequence > 0);
        assert!((snap.accelerometer.values[2] - 9.81).abs() < 1e-5);

        // Stop is idempotent
        imu.stop();
    }

    #[test]
    fn test_zero_rate_rejected() {
        let hub = SensorHub::new();
        let mut imu = SimulatedImu::new(0);
        assert!(imu.start(hub.feed()).is_err());
    }
}

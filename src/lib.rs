//! # imu-recorder: crash-safe IMU sampling service
//!
//! Samples an accelerometer and a gyroscope at a controlled rate, derives the
//! angular-rate norm, and durably appends every sample to a per-session CSV
//! log. The host may pause, kill or relaunch the process at any time; a
//! persisted session record lets a relaunched process resume the same
//! session file.
//!
//! ## Architecture
//!
//! - **Sensor**: latest-reading slots fed asynchronously by hardware (or the simulator)
//! - **Scheduler**: ticks on its own thread, adapting its interval to hold the target rate
//! - **Storage**: bounded row buffer, append-only sink, session state record
//! - **Power**: keep-awake lease held while recording
//! - **Session**: lifecycle state machine and control surface
//! - **Communication**: crossbeam channels for stop signalling and events
//!
//! ## Data flow
//!
//! ```text
//! SensorFeed -> SensorHub -> SamplingScheduler tick -> Sample -> RecordBuffer -> PersistentSink
//!                                                                          |
//!                               SessionStateStore <- session boundaries ---+
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use imu_recorder::{RecorderConfig, RecorderService, SensorHub};
//!
//! let hub = SensorHub::new();
//! let feed = hub.feed(); // hand to the hardware callback
//!
//! let service = RecorderService::new(RecorderConfig::default(), hub)?;
//! service.start_session("abc", 50)?;
//! // ...
//! service.stop()?;
//! ```

pub mod config;
pub mod error;
pub mod power;
pub mod scheduler;
pub mod sensor;
pub mod session;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{DuplicatePolicy, RateControlSettings, RecorderConfig};
pub use error::{ErrorKind, RecorderError, Result};
pub use power::{LeaseGuard, PowerLease, WakeLockBackend};
pub use scheduler::{ManualTicker, RateController, SamplingScheduler, Ticker};
pub use sensor::{SensorFeed, SensorHub, SensorSource, SimulatedImu};
pub use session::{
    RecorderEvent, RecorderService, SessionState, StartOutcome, StartRequest, StopOutcome,
};
pub use storage::{PersistentSink, RecordBuffer, SessionRecord, SessionStateStore};
pub use types::{RecordingStats, Sample, SensorChannel};

//! Sampling scheduler
//!
//! Drives the sample-production callback at a controlled cadence. The
//! [`Ticker`] trait is the seam between the recording session and whatever
//! produces ticks:
//!
//! - [`SamplingScheduler`] - timed driver on its own thread, adapting its
//!   interval through a [`RateController`]
//! - [`ManualTicker`] - caller-driven ticks with explicit timestamps, for
//!   replaying recorded timing and deterministic tests
//!
//! # Threading
//!
//! The scheduler thread waits on a crossbeam stop channel with a timeout
//! equal to the remaining interval, so `stop()` wakes it immediately instead
//! of waiting out a sleep. `stop()` joins the thread: once it returns no
//! further ticks are admitted.

pub mod manual;
pub mod rate;

pub use manual::ManualTicker;
pub use rate::{RateController, WindowReport};

use crate::config::RateControlSettings;
use crate::error::{RecorderError, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One invocation of the periodic callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Tick number since `start`, starting at 0
    pub sequence: u64,
    /// Wall-clock time of the tick
    pub wall_clock: DateTime<Utc>,
    /// Interval the scheduler is currently targeting
    pub interval: Duration,
    /// Set when this tick closed a rate measurement window
    pub window: Option<WindowReport>,
}

/// What the callback wants the scheduler to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep ticking
    Continue,
    /// Halt; no further ticks are delivered
    Stop,
}

/// Sample-production callback invoked exactly once per tick
pub type TickCallback = Box<dyn FnMut(&Tick) -> TickControl + Send>;

/// Source of periodic ticks
pub trait Ticker: Send {
    /// Begin ticking at `target_rate_hz`, invoking `callback` once per tick
    fn start(&mut self, target_rate_hz: u32, callback: TickCallback) -> Result<()>;

    /// Halt ticking and wait for an in-flight tick to finish; idempotent
    fn stop(&mut self);

    /// Whether ticks are currently being delivered
    fn is_running(&self) -> bool;
}

/// Timed scheduler running the tick loop on a dedicated thread
#[derive(Debug)]
pub struct SamplingScheduler {
    settings: RateControlSettings,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SamplingScheduler {
    /// Create an idle scheduler
    pub fn new(settings: RateControlSettings) -> Self {
        Self {
            settings,
            stop_tx: None,
            handle: None,
        }
    }
}

impl Default for SamplingScheduler {
    fn default() -> Self {
        Self::new(RateControlSettings::default())
    }
}

impl Ticker for SamplingScheduler {
    fn start(&mut self, target_rate_hz: u32, mut callback: TickCallback) -> Result<()> {
        if target_rate_hz == 0 {
            return Err(RecorderError::InvalidSession(
                "sampling rate must be positive".into(),
            ));
        }
        // Restarting replaces any previous loop
        self.stop();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let mut controller = RateController::new(target_rate_hz, self.settings);

        let handle = std::thread::Builder::new()
            .name("imu-sampler".into())
            .spawn(move || {
                tracing::debug!(target_rate_hz, "Sampling scheduler started");
                let mut last_tick = Instant::now();
                let mut sequence = 0u64;

                loop {
                    let deadline = last_tick + controller.current_interval();
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    let elapsed = now
                        .checked_duration_since(last_tick)
                        .unwrap_or(Duration::ZERO);
                    last_tick = now;

                    let window = controller.record_elapsed(elapsed);
                    let tick = Tick {
                        sequence,
                        wall_clock: Utc::now(),
                        interval: controller.current_interval(),
                        window,
                    };
                    sequence += 1;

                    if callback(&tick) == TickControl::Stop {
                        tracing::debug!("Tick callback requested stop");
                        break;
                    }
                }
                tracing::debug!(ticks = sequence, "Sampling scheduler stopped");
            })
            .map_err(|e| {
                RecorderError::Initialization(format!("Failed to spawn sampling thread: {}", e))
            })?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Sampling thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

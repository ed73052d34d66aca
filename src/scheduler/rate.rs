//! Adaptive tick interval
//!
//! [`RateController`] watches the achieved inter-tick timing over fixed
//! measurement windows and nudges the scheduler interval so the achieved
//! rate tracks the target despite OS scheduling jitter.
//!
//! At the end of every window:
//!
//! ```text
//! achieved = ticks / elapsed
//! error    = (achieved - target) / target
//! if |error| > deadband:
//!     interval += interval * error * gain      (running fast lengthens the interval)
//!     interval  = clamp(interval, min_factor * nominal, max_factor * nominal)
//! reset window
//! ```
//!
//! With the default settings this is a 10% deadband, 10% gain damped
//! proportional controller clamped to `[0.75, 1.25] × nominal`.

use crate::config::RateControlSettings;
use std::time::Duration;

/// Outcome of one completed measurement window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    /// Ticks counted in the window
    pub ticks: u32,
    /// Achieved rate over the window (Hz)
    pub achieved_rate_hz: f64,
    /// Normalized rate error `(achieved - target) / target`
    pub error: f64,
    /// Interval before the decision
    pub previous_interval: Duration,
    /// Interval after the decision
    pub interval: Duration,
    /// Whether the error left the deadband and the interval changed
    pub adjusted: bool,
}

/// Damped proportional controller over the tick interval
#[derive(Debug, Clone)]
pub struct RateController {
    settings: RateControlSettings,
    target_rate_hz: f64,
    nominal_secs: f64,
    current_secs: f64,
    min_secs: f64,
    max_secs: f64,
    window_secs: f64,
    window_ticks: u32,
    window_elapsed: f64,
    windows_completed: u64,
    last_report: Option<WindowReport>,
}

impl RateController {
    /// Create a controller for `target_rate_hz`, starting at the nominal interval
    pub fn new(target_rate_hz: u32, settings: RateControlSettings) -> Self {
        let target = target_rate_hz.max(1) as f64;
        let nominal = 1.0 / target;
        Self {
            settings,
            target_rate_hz: target,
            nominal_secs: nominal,
            current_secs: nominal,
            min_secs: nominal * settings.min_interval_factor,
            max_secs: nominal * settings.max_interval_factor,
            window_secs: settings.window().as_secs_f64(),
            window_ticks: 0,
            window_elapsed: 0.0,
            windows_completed: 0,
            last_report: None,
        }
    }

    /// Target rate in Hz
    pub fn target_rate_hz(&self) -> f64 {
        self.target_rate_hz
    }

    /// Interval the controller started from
    pub fn nominal_interval(&self) -> Duration {
        Duration::from_secs_f64(self.nominal_secs)
    }

    /// Interval the scheduler should use next
    pub fn current_interval(&self) -> Duration {
        Duration::from_secs_f64(self.current_secs)
    }

    /// Allowed interval range
    pub fn bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.min_secs),
            Duration::from_secs_f64(self.max_secs),
        )
    }

    /// Number of measurement windows evaluated so far
    pub fn windows_completed(&self) -> u64 {
        self.windows_completed
    }

    /// Report of the most recent window
    pub fn last_report(&self) -> Option<WindowReport> {
        self.last_report
    }

    /// Account one tick that arrived `elapsed_secs` after the previous one
    ///
    /// A zero or negative (clock anomaly) elapsed time is ignored entirely.
    /// Returns a report when this tick closes a measurement window.
    pub fn record_tick(&mut self, elapsed_secs: f64) -> Option<WindowReport> {
        if !(elapsed_secs > 0.0) || !elapsed_secs.is_finite() {
            return None;
        }

        self.window_ticks += 1;
        self.window_elapsed += elapsed_secs;

        if self.window_elapsed < self.window_secs {
            return None;
        }

        let report = self.close_window();
        self.last_report = Some(report);
        Some(report)
    }

    /// Convenience wrapper over [`record_tick`](Self::record_tick)
    pub fn record_elapsed(&mut self, elapsed: Duration) -> Option<WindowReport> {
        self.record_tick(elapsed.as_secs_f64())
    }

    fn close_window(&mut self) -> WindowReport {
        let achieved = self.window_ticks as f64 / self.window_elapsed;
        let error = (achieved - self.target_rate_hz) / self.target_rate_hz;
        let previous = self.current_secs;

        let adjusted = error.abs() > self.settings.deadband;
        if adjusted {
            self.current_secs += self.current_secs * error * self.settings.gain;
            self.current_secs = self.current_secs.clamp(self.min_secs, self.max_secs);
        }

        let report = WindowReport {
            ticks: self.window_ticks,
            achieved_rate_hz: achieved,
            error,
            previous_interval: Duration::from_secs_f64(previous),
            interval: Duration::from_secs_f64(self.current_secs),
            adjusted,
        };

        self.window_ticks = 0;
        self.window_elapsed = 0.0;
        self.windows_completed += 1;
        report
    }
}

//! Caller-driven ticker
//!
//! [`ManualTicker`] delivers a tick whenever [`ManualTicker::fire`] is called
//! with an explicit wall-clock time. Inter-tick timing is taken from those
//! timestamps and fed through the same [`RateController`] the timed scheduler
//! uses, so replayed timing exercises identical rate accounting.
//!
//! The handle is cheap to clone: one clone is owned by the recording
//! session, another by whoever drives the ticks.

use crate::config::RateControlSettings;
use crate::error::{RecorderError, Result};
use crate::scheduler::{RateController, Tick, TickCallback, TickControl, Ticker};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct ManualState {
    settings: RateControlSettings,
    callback: Option<TickCallback>,
    controller: Option<RateController>,
    last_tick: Option<DateTime<Utc>>,
    sequence: u64,
}

/// Ticker that fires only when told to
#[derive(Clone)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualState>>,
}

impl std::fmt::Debug for ManualTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTicker")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self::new(RateControlSettings::default())
    }
}

impl ManualTicker {
    /// Create an idle ticker
    pub fn new(settings: RateControlSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                settings,
                callback: None,
                controller: None,
                last_tick: None,
                sequence: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one tick at `at`
    ///
    /// Returns `false` when the ticker is stopped and the tick was not admitted.
    pub fn fire(&self, at: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        let ManualState {
            callback,
            controller,
            last_tick,
            sequence,
            ..
        } = &mut *state;

        let (Some(cb), Some(rc)) = (callback.as_mut(), controller.as_mut()) else {
            return false;
        };

        let window = (*last_tick).and_then(|prev| {
            let elapsed = (at - prev)
                .num_microseconds()
                .map(|us| us as f64 / 1_000_000.0)
                .unwrap_or(0.0);
            rc.record_tick(elapsed)
        });

        let tick = Tick {
            sequence: *sequence,
            wall_clock: at,
            interval: rc.current_interval(),
            window,
        };
        *last_tick = Some(at);
        *sequence += 1;

        if cb(&tick) == TickControl::Stop {
            *callback = None;
        }
        true
    }

    /// Deliver `count` ticks spaced by `spacing`, starting at `start`
    ///
    /// Returns the number of ticks admitted.
    pub fn fire_series(&self, start: DateTime<Utc>, spacing: chrono::Duration, count: usize) -> usize {
        let mut admitted = 0;
        let mut at = start;
        for _ in 0..count {
            if !self.fire(at) {
                break;
            }
            admitted += 1;
            at += spacing;
        }
        admitted
    }

    /// Current controller interval, if running
    pub fn current_interval(&self) -> Option<std::time::Duration> {
        self.lock().controller.as_ref().map(|rc| rc.current_interval())
    }
}

impl Ticker for ManualTicker {
    fn start(&mut self, target_rate_hz: u32, callback: TickCallback) -> Result<()> {
        if target_rate_hz == 0 {
            return Err(RecorderError::InvalidSession(
                "sampling rate must be positive".into(),
            ));
        }
        let mut state = self.lock();
        let settings = state.settings;
        state.controller = Some(RateController::new(target_rate_hz, settings));
        state.callback = Some(callback);
        state.last_tick = None;
        state.sequence = 0;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.callback = None;
        state.controller = None;
    }

    fn is_running(&self) -> bool {
        self.lock().callback.is_some()
    }
}

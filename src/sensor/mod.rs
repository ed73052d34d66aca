//! Sensor input: latest-reading slots for the two IMU channels
//!
//! Hardware (or the [`simulated`] driver) delivers readings asynchronously
//! through a [`SensorFeed`]; the sampling scheduler reads a momentary
//! [`SensorSnapshot`] through the [`SensorSource`] trait on every tick.
//!
//! # Sample-and-hold
//!
//! Each channel has exactly one slot. A delivery overwrites the slot, a
//! snapshot copies it. The scheduler never waits for a fresh reading, so a
//! slow channel's value is repeated across ticks. Every delivery bumps the
//! slot's sequence number, which lets the scheduler flag samples built only
//! from readings it has already consumed.

pub mod simulated;

pub use simulated::{SimulatedImu, WaveformPattern};

use crate::types::SensorChannel;
use std::sync::{Arc, Mutex, PoisonError};

/// The latest reading held for one channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisReading {
    /// Three-axis value
    pub values: [f32; 3],
    /// Number of deliveries so far (0 = never delivered)
    pub sequence: u64,
}

/// Momentary copy of both channel slots
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    pub accelerometer: AxisReading,
    pub gyroscope: AxisReading,
}

impl SensorSnapshot {
    /// True if neither channel changed since `previous`
    pub fn is_stale_since(&self, previous: &SensorSnapshot) -> bool {
        self.accelerometer.sequence == previous.accelerometer.sequence
            && self.gyroscope.sequence == previous.gyroscope.sequence
    }
}

/// Capability exposing the latest reading of each channel
pub trait SensorSource: Send + Sync {
    /// Copy the current slot contents without waiting for new data
    fn snapshot(&self) -> SensorSnapshot;
}

/// Shared latest-reading slots, one per channel
///
/// Each slot has a single writer (the delivery context) and a single
/// reader (the scheduler). The lock is held only for a copy.
#[derive(Debug, Default)]
pub struct SensorHub {
    accelerometer: Mutex<AxisReading>,
    gyroscope: Mutex<AxisReading>,
}

impl SensorHub {
    /// Create an empty hub wrapped for sharing
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handle for the delivery context
    pub fn feed(self: &Arc<Self>) -> SensorFeed {
        SensorFeed {
            hub: Arc::clone(self),
        }
    }

    fn slot(&self, channel: SensorChannel) -> &Mutex<AxisReading> {
        match channel {
            SensorChannel::Accelerometer => &self.accelerometer,
            SensorChannel::Gyroscope => &self.gyroscope,
        }
    }

    /// Overwrite a channel's slot
    pub fn deliver(&self, channel: SensorChannel, values: [f32; 3]) {
        let mut slot = self
            .slot(channel)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.values = values;
        slot.sequence = slot.sequence.wrapping_add(1);
    }

    /// Latest reading for one channel
    pub fn latest(&self, channel: SensorChannel) -> AxisReading {
        *self
            .slot(channel)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SensorSource for SensorHub {
    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            accelerometer: self.latest(SensorChannel::Accelerometer),
            gyroscope: self.latest(SensorChannel::Gyroscope),
        }
    }
}

/// Cloneable delivery handle handed to the hardware event callback
#[derive(Debug, Clone)]
pub struct SensorFeed {
    hub: Arc<SensorHub>,
}

impl SensorFeed {
    /// Push an accelerometer event
    pub fn accelerometer(&self, values: [f32; 3]) {
        self.hub.deliver(SensorChannel::Accelerometer, values);
    }

    /// Push a gyroscope event
    pub fn gyroscope(&self, values: [f32; 3]) {
        self.hub.deliver(SensorChannel::Gyroscope, values);
    }

    /// Push an event for either channel
    pub fn deliver(&self, channel: SensorChannel, values: [f32; 3]) {
        self.hub.deliver(channel, values);
    }
}

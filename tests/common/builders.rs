//! Test rigs for the recorder service

use super::mock_helpers::{CountingWakeLock, FaultPlan, FlakyOpener};
use chrono::{DateTime, Utc};
use imu_recorder::{
    DuplicatePolicy, ManualTicker, PowerLease, RecorderConfig, RecorderService, SensorFeed,
    SensorHub, SessionStateStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Nominal 50 Hz tick spacing
pub fn tick_spacing() -> chrono::Duration {
    chrono::Duration::milliseconds(20)
}

/// Builder for a [`Rig`]
pub struct RigBuilder {
    buffer_capacity: usize,
    duplicate_policy: DuplicatePolicy,
    stop_timeout_ms: u64,
    event_queue_capacity: Option<usize>,
}

impl Default for RigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            buffer_capacity: 200,
            duplicate_policy: DuplicatePolicy::Reject,
            stop_timeout_ms: 5_000,
            event_queue_capacity: None,
        }
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn stop_timeout_ms(mut self, ms: u64) -> Self {
        self.stop_timeout_ms = ms;
        self
    }

    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RecorderConfig::with_data_dir(dir.path());
        config.buffer_capacity = self.buffer_capacity;
        config.duplicate_policy = self.duplicate_policy;
        config.stop_timeout_ms = self.stop_timeout_ms;
        if let Some(capacity) = self.event_queue_capacity {
            config.event_queue_capacity = capacity;
        }

        let hub = SensorHub::new();
        let wake = CountingWakeLock::default();
        let opener = FlakyOpener::default();
        let mut rig = Rig {
            service: None,
            config,
            dir,
            feed: hub.feed(),
            hub,
            ticker: ManualTicker::default(),
            wake: wake.clone(),
            lease: PowerLease::new(Box::new(wake)),
            faults: Arc::clone(&opener.plan),
            opener,
            clock: Utc::now(),
        };
        rig.relaunch();
        rig
    }
}

/// One recorder service wired to a manual ticker, counting wake lock and
/// fault-injectable storage inside a temporary data directory
pub struct Rig {
    service: Option<RecorderService>,
    pub config: RecorderConfig,
    pub dir: TempDir,
    pub hub: Arc<SensorHub>,
    pub feed: SensorFeed,
    pub ticker: ManualTicker,
    pub wake: CountingWakeLock,
    pub lease: PowerLease,
    pub faults: Arc<FaultPlan>,
    opener: FlakyOpener,
    clock: DateTime<Utc>,
}

impl Rig {
    pub fn service(&self) -> &RecorderService {
        self.service.as_ref().unwrap()
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn session_path(&self, id: &str) -> PathBuf {
        self.dir.path().join(format!("sensor_data_{}.csv", id))
    }

    pub fn store(&self) -> SessionStateStore {
        SessionStateStore::new(self.dir.path().join("session_state.json"))
    }

    fn build_service(&self) -> RecorderService {
        RecorderService::builder(self.config.clone())
            .source(self.hub.clone())
            .manual_ticker(self.ticker.clone())
            .lease(self.lease.clone())
            .log_opener(Arc::new(self.opener.clone()))
            .build()
            .unwrap()
    }

    /// Tear the service down with in-process cleanup and start a fresh one
    pub fn relaunch(&mut self) {
        self.service = None;
        self.ticker = ManualTicker::default();
        self.service = Some(self.build_service());
    }

    /// Lose the service without running any cleanup, then start a fresh one
    pub fn kill_and_relaunch(&mut self) {
        if let Some(service) = self.service.take() {
            std::mem::forget(service);
        }
        self.ticker = ManualTicker::default();
        self.service = Some(self.build_service());
    }

    /// Deliver one reading on each channel
    pub fn deliver(&self, accel: [f32; 3], gyro: [f32; 3]) {
        self.feed.accelerometer(accel);
        self.feed.gyroscope(gyro);
    }

    /// Fire `count` ticks at the nominal 50 Hz spacing; returns ticks admitted
    pub fn tick(&mut self, count: usize) -> usize {
        let admitted = self.ticker.fire_series(self.clock, tick_spacing(), count);
        self.clock += tick_spacing() * count as i32;
        admitted
    }
}

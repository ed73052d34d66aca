//! One active recording session
//!
//! A [`RecordingSession`] owns everything that lives exactly as long as a
//! session: the buffered log, the ticker driving it, and the power lease
//! guard. Samples flow from the [`SensorSource`] through the tick callback
//! into the [`SampleLog`]; the callback and the control surface share the
//! log behind one mutex so appends and flushes never interleave.

use crate::error::{RecorderError, Result};
use crate::power::LeaseGuard;
use crate::scheduler::{Tick, TickControl, Ticker};
use crate::sensor::{SensorSnapshot, SensorSource};
use crate::session::types::{EventBus, FaultReport, RecorderEvent, SessionInfo};
use crate::storage::{AppendOutcome, FlushReport, SampleLog};
use crate::types::{RecordingStats, Sample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

/// Slot holding the most recent sample, shared with the control surface
pub type LatestSample = Arc<Mutex<Option<Sample>>>;

/// Counters updated from the tick path without taking the log lock twice
#[derive(Debug, Default)]
struct SessionCounters {
    samples_produced: AtomicU64,
    stale_samples: AtomicU64,
    interval_nanos: AtomicU64,
    achieved_rate_bits: AtomicU64,
}

fn lock_log(log: &Mutex<SampleLog>) -> MutexGuard<'_, SampleLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wall-clock seconds since the epoch with microsecond resolution
fn epoch_seconds(tick: &Tick) -> f64 {
    tick.wall_clock.timestamp_micros() as f64 / 1_000_000.0
}

/// State owned by one session
pub struct RecordingSession {
    info: SessionInfo,
    generation: u64,
    log: Arc<Mutex<SampleLog>>,
    counters: Arc<SessionCounters>,
    ticker: Option<Box<dyn Ticker>>,
    lease: Option<LeaseGuard>,
    pending_stop: Option<Receiver<Result<FlushReport>>>,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("info", &self.info)
            .field("generation", &self.generation)
            .field("sampling", &self.is_sampling())
            .field("stopping", &self.pending_stop.is_some())
            .finish()
    }
}

impl RecordingSession {
    /// Wrap an initialized log; nothing is sampled until [`start_sampling`](Self::start_sampling)
    pub fn new(info: SessionInfo, log: SampleLog, generation: u64) -> Self {
        Self {
            info,
            generation,
            log: Arc::new(Mutex::new(log)),
            counters: Arc::new(SessionCounters::default()),
            ticker: None,
            lease: None,
            pending_stop: None,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    pub fn file_path(&self) -> &Path {
        &self.info.file_path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_sampling(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| t.is_running())
    }

    /// Keep the power lease for the rest of the session
    pub fn hold_lease(&mut self, guard: LeaseGuard) {
        self.lease = Some(guard);
    }

    /// Re-take the power lease after a redundant start
    pub fn reassert_lease(&self) -> Result<()> {
        match &self.lease {
            Some(guard) => guard.reassert(),
            None => Ok(()),
        }
    }

    /// Give up the power lease (subject to keep-awake deferral)
    pub fn release_lease(&mut self) {
        if let Some(guard) = self.lease.take() {
            guard.release();
        }
    }

    /// Start the ticker with a callback that samples, encodes and appends
    ///
    /// A write that fails even after the sink reinitialized stops the
    /// ticker, emits a fault event and sends the error on `faults`.
    pub fn start_sampling(
        &mut self,
        mut ticker: Box<dyn Ticker>,
        rate_hz: u32,
        source: Arc<dyn SensorSource>,
        latest: LatestSample,
        events: EventBus,
        faults: Sender<RecorderError>,
    ) -> Result<()> {
        let log = Arc::clone(&self.log);
        let counters = Arc::clone(&self.counters);
        let session_id = self.info.session_id.clone();
        let mut previous: Option<SensorSnapshot> = None;

        let callback = Box::new(move |tick: &Tick| {
            let snapshot = source.snapshot();
            let stale = previous.is_some_and(|p| snapshot.is_stale_since(&p));
            previous = Some(snapshot);

            let sample = Sample::new(
                epoch_seconds(tick),
                snapshot.accelerometer.values,
                snapshot.gyroscope.values,
            )
            .with_stale(stale);

            *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
            counters
                .interval_nanos
                .store(tick.interval.as_nanos() as u64, Ordering::Relaxed);
            if stale {
                counters.stale_samples.fetch_add(1, Ordering::Relaxed);
            }

            if let Some(window) = tick.window {
                counters
                    .achieved_rate_bits
                    .store(window.achieved_rate_hz.to_bits(), Ordering::Relaxed);
                tracing::debug!(
                    achieved_rate_hz = format_args!("{:.2}", window.achieved_rate_hz),
                    interval_us = window.interval.as_micros() as u64,
                    adjusted = window.adjusted,
                    "Sampling rate"
                );
                events.emit(RecorderEvent::RateAdjusted {
                    achieved_rate_hz: window.achieved_rate_hz,
                    interval: window.interval,
                    adjusted: window.adjusted,
                });
            }

            let outcome = {
                let mut log = lock_log(&log);
                counters.samples_produced.fetch_add(1, Ordering::Relaxed);
                log.append_sample(&sample)
            };

            match outcome {
                Ok(AppendOutcome::Buffered) => TickControl::Continue,
                Ok(AppendOutcome::Flushed(report)) => {
                    events.emit(RecorderEvent::Flushed {
                        session_id: session_id.clone(),
                        rows: report.rows,
                        total_rows_written: report.total_rows_written,
                        recovered: report.recovered,
                    });
                    TickControl::Continue
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Sample write failed, stopping");
                    events.emit(RecorderEvent::Fault(FaultReport::from(&e)));
                    let _ = faults.try_send(e);
                    TickControl::Stop
                }
            }
        });

        ticker.start(rate_hz, callback)?;
        self.ticker = Some(ticker);
        tracing::info!(
            session_id = %self.info.session_id,
            rate_hz,
            "Sampling started"
        );
        Ok(())
    }

    /// Stop sampling and drain the buffer on a worker thread
    ///
    /// Returns the channel the outcome arrives on. Calling this again while
    /// a drain is in flight returns the same channel.
    pub fn begin_stop(&mut self) -> Result<Receiver<Result<FlushReport>>> {
        if let Some(rx) = &self.pending_stop {
            return Ok(rx.clone());
        }

        let (tx, rx) = bounded(1);
        let ticker = self.ticker.take();
        let log = Arc::clone(&self.log);
        let session_id = self.info.session_id.clone();

        std::thread::Builder::new()
            .name("imu-stop".into())
            .spawn(move || {
                if let Some(mut ticker) = ticker {
                    ticker.stop();
                }
                let result = lock_log(&log).close();
                if let Err(e) = &result {
                    tracing::error!(session_id = %session_id, error = %e, "Final flush failed");
                }
                let _ = tx.send(result);
            })
            .map_err(|e| RecorderError::Channel(format!("Failed to spawn stop thread: {}", e)))?;

        self.pending_stop = Some(rx.clone());
        Ok(rx)
    }

    /// Stop sampling and wait up to `timeout` for the final flush
    pub fn stop_within(&mut self, timeout: Duration) -> Result<FlushReport> {
        let rx = self.begin_stop()?;
        match rx.recv_timeout(timeout) {
            Ok(Ok(report)) => {
                self.pending_stop = None;
                Ok(report)
            }
            Ok(Err(e)) => {
                // Allow a retry to run the drain again
                self.pending_stop = None;
                Err(RecorderError::IncompleteFlush(format!(
                    "final flush of '{}' failed: {}",
                    self.info.session_id, e
                )))
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(RecorderError::IncompleteFlush(format!(
                    "final flush of '{}' did not finish within {} ms",
                    self.info.session_id,
                    timeout.as_millis()
                )))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                self.pending_stop = None;
                Err(RecorderError::IncompleteFlush(format!(
                    "stop thread for '{}' exited without reporting",
                    self.info.session_id
                )))
            }
        }
    }

    /// Counters for this session
    pub fn stats(&self) -> RecordingStats {
        self.stats_from(&lock_log(&self.log))
    }

    /// Statistics without waiting on a log held by a stalled flush
    pub fn try_stats(&self) -> Option<RecordingStats> {
        match self.log.try_lock() {
            Ok(log) => Some(self.stats_from(&log)),
            Err(TryLockError::Poisoned(e)) => Some(self.stats_from(&e.into_inner())),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn stats_from(&self, log: &SampleLog) -> RecordingStats {
        RecordingStats {
            samples_produced: self.counters.samples_produced.load(Ordering::Relaxed),
            rows_written: log.rows_written(),
            rows_buffered: log.rows_buffered(),
            flushes: log.flushes(),
            recovered_write_failures: log.recovered_writes(),
            stale_samples: self.counters.stale_samples.load(Ordering::Relaxed),
            dropped_events: 0,
            current_interval: Duration::from_nanos(
                self.counters.interval_nanos.load(Ordering::Relaxed),
            ),
            achieved_rate_hz: f64::from_bits(
                self.counters.achieved_rate_bits.load(Ordering::Relaxed),
            ),
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        if self.pending_stop.is_none() {
            if let Err(e) = lock_log(&self.log).close() {
                tracing::warn!(
                    session_id = %self.info.session_id,
                    error = %e,
                    "Best-effort flush on teardown failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::PowerLease;
    use crate::scheduler::ManualTicker;
    use crate::sensor::SensorHub;
    use crate::storage::PersistentSink;
    use chrono::Utc;

    fn open_session(dir: &Path, id: &str, capacity: usize) -> RecordingSession {
        let sink = PersistentSink::open(dir, id).unwrap();
        let info = SessionInfo {
            session_id: id.to_string(),
            started_at: Utc::now(),
            file_path: sink.path().to_path_buf(),
            resumed: false,
            sampling_rate_hz: 50,
        };
        RecordingSession::new(info, SampleLog::new(sink, capacity), 1)
    }

    #[test]
    fn test_ticks_become_rows_and_stop_drains() {
        let dir = tempfile::tempdir().unwrap();
        let hub = SensorHub::new();
        hub.feed().accelerometer([0.0, 0.0, 9.81]);
        hub.feed().gyroscope([0.0, 3.0, 4.0]);

        let ticker = ManualTicker::default();
        let latest: LatestSample = Arc::default();
        let (fault_tx, fault_rx) = bounded(1);

        let mut session = open_session(dir.path(), "unit", 4);
        session
            .start_sampling(
                Box::new(ticker.clone()),
                50,
                hub.clone(),
                latest.clone(),
                EventBus::new(16),
                fault_tx,
            )
            .unwrap();

        assert_eq!(
            ticker.fire_series(Utc::now(), chrono::Duration::milliseconds(20), 6),
            6
        );
        let stats = session.stats();
        assert_eq!(stats.samples_produced, 6);
        assert_eq!(stats.rows_written, 4);
        assert_eq!(stats.rows_buffered, 2);
        assert!(stats.rows_accounted());
        // Readings were delivered once, so every tick after the first is stale
        assert_eq!(stats.stale_samples, 5);

        let sample = latest.lock().unwrap().unwrap();
        assert!((sample.gyro_norm - 5.0).abs() < 1e-6);

        let report = session.stop_within(Duration::from_secs(5)).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.total_rows_written, 6);
        assert!(!ticker.is_running());
        assert!(fault_rx.try_recv().is_err());

        let content = std::fs::read_to_string(session.file_path()).unwrap();
        assert_eq!(content.lines().count(), 7);
    }

    #[test]
    fn test_lease_released_with_session() {
        let dir = tempfile::tempdir().unwrap();
        let lease = PowerLease::default();
        {
            let mut session = open_session(dir.path(), "lease", 10);
            session.hold_lease(lease.acquire_guard().unwrap());
            session.reassert_lease().unwrap();
            assert!(lease.is_held());
        }
        assert!(!lease.is_held());
    }

    #[test]
    fn test_drop_flushes_buffered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let session = open_session(dir.path(), "drop", 100);
            lock_log(&session.log)
                .append_sample(&Sample::new(1.0, [0.0; 3], [0.0; 3]))
                .unwrap();
            session.file_path().to_path_buf()
        };
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}

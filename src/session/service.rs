//! Recorder orchestrator and control surface
//!
//! [`RecorderService`] runs the session lifecycle:
//!
//! ```text
//! Idle --start--> Initializing --ok--> Recording --stop--> Stopping --done--> Idle
//!                      |                    |
//!                      +--error--> Failed --+--> Idle
//! ```
//!
//! # Start
//!
//! The session file is opened (header written if new) first; the session
//! record is persisted only once the file is ready; the power lease is
//! taken only once the record is durable; sampling starts last. Any failure
//! along the way unwinds what that attempt set up and leaves the service
//! `Idle` without the lease.
//!
//! A start without a session id runs the recovery protocol: the persisted
//! record is resumed with its original start time, or the start fails with
//! [`RecorderError::RecoveryFailure`] when nothing was persisted.
//!
//! # Stop
//!
//! Stop halts the ticker, drains the buffer and closes the file on a worker
//! thread, waiting at most the configured stop timeout. Only a completed
//! drain releases the lease and clears the record; a timeout is reported as
//! [`RecorderError::IncompleteFlush`] and leaves the session in `Stopping`
//! so the caller can retry.
//!
//! # Faults
//!
//! A write that keeps failing after the sink reinitialized stops sampling.
//! A watcher thread then moves the service through `Failed` to `Idle`,
//! releases the lease and clears the record.
//!
//! # Teardown
//!
//! Dropping the service stops sampling, makes a best-effort flush and
//! releases the lease but keeps the session record, so a relaunched process
//! can resume the session.

use crate::config::{ensure_dir, DuplicatePolicy, RateControlSettings, RecorderConfig};
use crate::error::{RecorderError, Result};
use crate::power::PowerLease;
use crate::scheduler::{ManualTicker, SamplingScheduler, Ticker};
use crate::sensor::SensorSource;
use crate::session::recording::{LatestSample, RecordingSession};
use crate::session::types::{
    validate_session_id, EventBus, FaultReport, RecorderEvent, SessionInfo, SessionState,
    StartOutcome, StartRequest, StopOutcome,
};
use crate::storage::{
    FsLogOpener, LogOpener, PersistentSink, SampleLog, SessionRecord, SessionStateStore,
};
use crate::types::{RecordingStats, Sample, ZERO_AXES};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Builds the ticker for each new session
pub type TickerFactory = Box<dyn Fn() -> Box<dyn Ticker> + Send + Sync>;

struct ServiceInner {
    state: SessionState,
    session: Option<RecordingSession>,
    generation: u64,
    last_fault: Option<FaultReport>,
    last_stats: RecordingStats,
}

struct Shared {
    config: RecorderConfig,
    data_dir: PathBuf,
    store: SessionStateStore,
    lease: PowerLease,
    events: EventBus,
    latest: LatestSample,
    inner: Mutex<ServiceInner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServiceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut ServiceInner, to: SessionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(from = %from, to = %to, "Recorder state changed");
        self.events.emit(RecorderEvent::StateChanged { from, to });
    }

    fn clear_latest(&self) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn clear_record(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear session record");
        }
    }

    fn record_fault(&self, inner: &mut ServiceInner, error: &RecorderError) {
        let report = FaultReport::from(error);
        self.events.emit(RecorderEvent::Fault(report.clone()));
        inner.last_fault = Some(report);
    }

    /// Tear down a session whose writes failed during sampling
    fn handle_write_fault(&self, generation: u64, error: RecorderError) {
        let mut inner = self.lock();
        let matches = inner
            .session
            .as_ref()
            .is_some_and(|s| s.generation() == generation);
        if !matches || inner.state != SessionState::Recording {
            return;
        }

        self.transition(&mut inner, SessionState::Failed);
        inner.last_fault = Some(FaultReport::from(&error));

        if let Some(mut session) = inner.session.take() {
            tracing::error!(
                session_id = %session.session_id(),
                error = %error,
                "Recording failed, releasing resources"
            );
            let flushed = session.stop_within(self.config.stop_timeout());
            let stats = session.try_stats();
            if let Err(e) = flushed {
                tracing::error!(
                    session_id = %session.session_id(),
                    rows_lost = stats.as_ref().map(|s| s.rows_buffered),
                    error = %e,
                    "Buffered rows lost after write failure"
                );
            }
            if let Some(stats) = stats {
                inner.last_stats = stats;
            }
            session.release_lease();
        }
        self.clear_record();
        self.clear_latest();
        self.transition(&mut inner, SessionState::Idle);
    }
}

/// Configures and builds a [`RecorderService`]
pub struct RecorderServiceBuilder {
    config: RecorderConfig,
    source: Option<Arc<dyn SensorSource>>,
    ticker_factory: Option<TickerFactory>,
    lease: Option<PowerLease>,
    opener: Option<Arc<dyn LogOpener>>,
}

impl RecorderServiceBuilder {
    /// Sensor slots sampled on every tick
    pub fn source(mut self, source: Arc<dyn SensorSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Custom ticker per session
    pub fn ticker_factory(mut self, factory: TickerFactory) -> Self {
        self.ticker_factory = Some(factory);
        self
    }

    /// Drive every session from one caller-controlled ticker
    pub fn manual_ticker(self, ticker: ManualTicker) -> Self {
        self.ticker_factory(Box::new(move || Box::new(ticker.clone()) as Box<dyn Ticker>))
    }

    /// Power lease shared with other collaborators
    pub fn lease(mut self, lease: PowerLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// File access used by session sinks
    pub fn log_opener(mut self, opener: Arc<dyn LogOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn build(self) -> Result<RecorderService> {
        self.config.validate()?;
        let data_dir = self.config.resolve_data_dir()?;
        let store = SessionStateStore::new(data_dir.join(&self.config.state_file));

        let source = self
            .source
            .ok_or_else(|| RecorderError::Config("a sensor source is required".into()))?;
        let ticker_factory: TickerFactory = match self.ticker_factory {
            Some(factory) => factory,
            None => {
                let settings: RateControlSettings = self.config.rate_control;
                Box::new(move || Box::new(SamplingScheduler::new(settings)) as Box<dyn Ticker>)
            }
        };

        let shared = Arc::new(Shared {
            events: EventBus::new(self.config.event_queue_capacity),
            config: self.config,
            data_dir,
            store,
            lease: self.lease.unwrap_or_default(),
            latest: Arc::default(),
            inner: Mutex::new(ServiceInner {
                state: SessionState::Idle,
                session: None,
                generation: 0,
                last_fault: None,
                last_stats: RecordingStats::default(),
            }),
        });

        Ok(RecorderService {
            shared,
            source,
            ticker_factory,
            opener: self.opener.unwrap_or_else(|| Arc::new(FsLogOpener)),
        })
    }
}

/// Orchestrator owning at most one recording session
pub struct RecorderService {
    shared: Arc<Shared>,
    source: Arc<dyn SensorSource>,
    ticker_factory: TickerFactory,
    opener: Arc<dyn LogOpener>,
}

impl std::fmt::Debug for RecorderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderService")
            .field("state", &self.state())
            .field("data_dir", &self.shared.data_dir)
            .finish()
    }
}

impl RecorderService {
    pub fn builder(config: RecorderConfig) -> RecorderServiceBuilder {
        RecorderServiceBuilder {
            config,
            source: None,
            ticker_factory: None,
            lease: None,
            opener: None,
        }
    }

    /// Service with the timed scheduler and the logging wake lock
    pub fn new(config: RecorderConfig, source: Arc<dyn SensorSource>) -> Result<Self> {
        Self::builder(config).source(source).build()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    pub fn state_store(&self) -> &SessionStateStore {
        &self.shared.store
    }

    pub fn lease(&self) -> &PowerLease {
        &self.shared.lease
    }

    /// Start, reopen or resume a session
    pub fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        if request.sampling_rate_hz == 0 {
            let err = RecorderError::InvalidSession("sampling rate must be positive".into());
            self.shared.record_fault(&mut self.shared.lock(), &err);
            return Err(err);
        }
        if let Some(id) = &request.session_id {
            if let Err(err) = validate_session_id(id) {
                self.shared.record_fault(&mut self.shared.lock(), &err);
                return Err(err);
            }
        }

        let mut inner = self.shared.lock();

        // A relaunch while this process is already recording keeps the current session
        let requested = match (&request.session_id, &inner.session) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(session)) if inner.state == SessionState::Recording => {
                Some(session.session_id().to_string())
            }
            (None, _) => None,
        };

        match inner.state {
            SessionState::Recording => {
                let active = inner.session.as_ref().map(|s| s.info().clone());
                if let (Some(requested), Some(active)) = (requested.as_deref(), active) {
                    if requested == active.session_id {
                        let reasserted = inner
                            .session
                            .as_ref()
                            .map_or(Ok(()), |s| s.reassert_lease());
                        if let Err(err) = reasserted {
                            tracing::warn!(session_id = %requested, error = %err, "Power lease re-assert failed");
                            self.shared.record_fault(&mut inner, &err);
                            return Err(err);
                        }
                        tracing::info!(session_id = %requested, "Already recording, lease re-asserted");
                        return Ok(StartOutcome::AlreadyRecording(active));
                    }

                    match self.shared.config.duplicate_policy {
                        DuplicatePolicy::Reject => {
                            let err = RecorderError::DuplicateSession {
                                active: active.session_id,
                                requested: requested.to_string(),
                            };
                            tracing::warn!(error = %err, "Start rejected");
                            self.shared.record_fault(&mut inner, &err);
                            return Err(err);
                        }
                        DuplicatePolicy::Restart => {
                            tracing::info!(
                                active = %active.session_id,
                                requested = %requested,
                                "Restarting with new session"
                            );
                            self.stop_locked(&mut inner)?;
                        }
                    }
                }
            }
            SessionState::Stopping => {
                let active = inner
                    .session
                    .as_ref()
                    .map(|s| s.session_id().to_string())
                    .unwrap_or_default();
                let err = RecorderError::IncompleteFlush(format!(
                    "session '{}' has not finished stopping",
                    active
                ));
                self.shared.record_fault(&mut inner, &err);
                return Err(err);
            }
            SessionState::Idle | SessionState::Initializing | SessionState::Failed => {}
        }

        let (session_id, started_at, resumed, dir) = match requested {
            Some(id) => (id, Utc::now(), false, self.shared.data_dir.clone()),
            None => match self.recover()? {
                Some(found) => found,
                None => {
                    let err = RecorderError::RecoveryFailure(
                        "relaunched without a session id and no session was persisted".into(),
                    );
                    tracing::error!(error = %err, "Refusing to record with unknown session");
                    self.shared.record_fault(&mut inner, &err);
                    return Err(err);
                }
            },
        };

        self.initialize_locked(
            &mut inner,
            session_id,
            started_at,
            resumed,
            &dir,
            request.sampling_rate_hz,
        )
    }

    /// Start a named session
    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        sampling_rate_hz: u32,
    ) -> Result<StartOutcome> {
        self.start(StartRequest::new(session_id, sampling_rate_hz))
    }

    /// Resume the persisted session
    pub fn resume(&self, sampling_rate_hz: u32) -> Result<StartOutcome> {
        self.start(StartRequest::recover(sampling_rate_hz))
    }

    fn recover(&self) -> Result<Option<(String, DateTime<Utc>, bool, PathBuf)>> {
        let Some(record) = self.shared.store.load()? else {
            return Ok(None);
        };
        if let Err(e) = validate_session_id(&record.session_id) {
            return Err(RecorderError::RecoveryFailure(format!(
                "persisted session is unusable: {}",
                e
            )));
        }

        let started_at = record.started_at().unwrap_or_else(|| {
            tracing::warn!(
                start_time_millis = record.start_time_millis,
                "Persisted start time out of range, using now"
            );
            Utc::now()
        });
        let dir = record
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.shared.data_dir.clone());

        tracing::info!(session_id = %record.session_id, "Resuming persisted session");
        Ok(Some((record.session_id, started_at, true, dir)))
    }

    fn initialize_locked(
        &self,
        inner: &mut ServiceInner,
        session_id: String,
        started_at: DateTime<Utc>,
        resumed: bool,
        dir: &Path,
        rate_hz: u32,
    ) -> Result<StartOutcome> {
        self.shared.transition(inner, SessionState::Initializing);
        inner.generation += 1;
        let generation = inner.generation;
        let mut persisted = false;

        let result = (|| -> Result<(RecordingSession, Receiver<RecorderError>)> {
            ensure_dir(dir)?;
            let sink = PersistentSink::open_with(Arc::clone(&self.opener), dir, &session_id)?;
            let info = SessionInfo {
                session_id: session_id.clone(),
                started_at,
                file_path: sink.path().to_path_buf(),
                resumed,
                sampling_rate_hz: rate_hz,
            };

            let record = SessionRecord::new(&session_id, started_at, info.file_path.clone());
            self.shared.store.persist(&record).map_err(|e| {
                RecorderError::Initialization(format!("Failed to persist session record: {}", e))
            })?;
            persisted = true;

            let log = SampleLog::new(sink, self.shared.config.buffer_capacity);
            let mut session = RecordingSession::new(info, log, generation);
            session.hold_lease(self.shared.lease.acquire_guard()?);

            let (fault_tx, fault_rx) = bounded(1);
            session.start_sampling(
                (self.ticker_factory)(),
                rate_hz,
                Arc::clone(&self.source),
                Arc::clone(&self.shared.latest),
                self.shared.events.clone(),
                fault_tx,
            )?;
            Ok((session, fault_rx))
        })();

        match result {
            Ok((session, fault_rx)) => {
                let info = session.info().clone();
                inner.session = Some(session);
                inner.last_stats = RecordingStats::default();
                self.shared.transition(inner, SessionState::Recording);
                self.spawn_fault_watch(generation, fault_rx);

                tracing::info!(
                    session_id = %info.session_id,
                    path = %info.file_path.display(),
                    resumed,
                    "Recording"
                );
                Ok(if resumed {
                    StartOutcome::Resumed(info)
                } else {
                    StartOutcome::Started(info)
                })
            }
            Err(err) => {
                self.shared.transition(inner, SessionState::Failed);
                tracing::error!(session_id = %session_id, error = %err, "Session setup failed");
                // A resumed record predates this attempt and stays for the next relaunch
                if persisted && !resumed {
                    self.shared.clear_record();
                }
                self.shared.record_fault(inner, &err);
                self.shared.transition(inner, SessionState::Idle);
                Err(err)
            }
        }
    }

    fn spawn_fault_watch(&self, generation: u64, faults: Receiver<RecorderError>) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("imu-fault-watch".into())
            .spawn(move || {
                // Ends when the session's ticker drops its sender
                if let Ok(error) = faults.recv() {
                    if let Some(shared) = shared.upgrade() {
                        shared.handle_write_fault(generation, error);
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to spawn fault watcher");
        }
    }

    /// Stop the active session, waiting for the final flush
    ///
    /// Stopping with no session is a no-op that returns
    /// [`StopOutcome::NotRecording`].
    pub fn stop(&self) -> Result<StopOutcome> {
        let mut inner = self.shared.lock();
        self.stop_locked(&mut inner)
    }

    fn stop_locked(&self, inner: &mut ServiceInner) -> Result<StopOutcome> {
        if !inner.state.has_session() || inner.session.is_none() {
            return Ok(StopOutcome::NotRecording);
        }
        self.shared.transition(inner, SessionState::Stopping);

        let timeout = self.shared.config.stop_timeout();
        let report = match inner.session.as_mut().map(|s| s.stop_within(timeout)) {
            Some(Ok(report)) => report,
            Some(Err(err)) => {
                tracing::error!(error = %err, "Stop did not complete");
                self.shared.record_fault(inner, &err);
                return Err(err);
            }
            None => return Ok(StopOutcome::NotRecording),
        };

        let Some(mut session) = inner.session.take() else {
            return Ok(StopOutcome::NotRecording);
        };
        inner.last_stats = session.stats();
        session.release_lease();
        self.shared.clear_record();
        self.shared.clear_latest();

        let session_id = session.session_id().to_string();
        let file_path = session.file_path().to_path_buf();
        drop(session);

        self.shared.transition(inner, SessionState::Idle);
        self.shared.events.emit(RecorderEvent::Stopped {
            session_id: session_id.clone(),
            rows_written: report.total_rows_written,
        });
        tracing::info!(
            session_id = %session_id,
            rows = report.total_rows_written,
            "Session stopped"
        );

        Ok(StopOutcome::Stopped {
            session_id,
            file_path,
            rows_written: report.total_rows_written,
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Most recent sample as `[ax, ay, az, gx, gy, gz]`; zeros when no session is active
    pub fn get_latest_sample(&self) -> [f64; 6] {
        self.latest_sample().map(|s| s.axes()).unwrap_or(ZERO_AXES)
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        *self.shared.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest acceleration; zeros when no session is active
    pub fn latest_accelerometer(&self) -> [f64; 3] {
        let axes = self.get_latest_sample();
        [axes[0], axes[1], axes[2]]
    }

    /// Latest angular rate; zeros when no session is active
    pub fn latest_gyroscope(&self) -> [f64; 3] {
        let axes = self.get_latest_sample();
        [axes[3], axes[4], axes[5]]
    }

    pub fn current_session_file_path(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|s| s.file_path().to_path_buf())
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.shared.lock().session.as_ref().map(|s| s.info().clone())
    }

    /// Assert or clear the external keep-awake condition
    pub fn set_keep_awake(&self, active: bool) {
        self.shared.lease.set_keep_awake(active);
    }

    /// Statistics for the active session, or the last one if idle
    pub fn stats(&self) -> RecordingStats {
        let inner = self.shared.lock();
        let mut stats = match &inner.session {
            Some(session) => session.stats(),
            None => inner.last_stats.clone(),
        };
        stats.dropped_events = self.shared.events.dropped();
        stats
    }

    /// Most recent failure reported through the control surface
    pub fn last_fault(&self) -> Option<FaultReport> {
        self.shared.lock().last_fault.clone()
    }

    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for RecorderService {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if let Some(mut session) = inner.session.take() {
            tracing::info!(
                session_id = %session.session_id(),
                "Teardown while recording, session record kept for recovery"
            );
            if let Err(e) = session.stop_within(self.shared.config.stop_timeout()) {
                tracing::warn!(error = %e, "Best-effort flush on teardown did not complete");
            }
            session.release_lease();
        }
        self.shared.clear_latest();
        inner.state = SessionState::Idle;
    }
}

//! Recording sessions and their orchestrator
//!
//! This module ties the sampling, storage and power layers into the
//! session lifecycle exposed to the control surface.
//!
//! # Features
//!
//! - Start, reopen and resume sessions keyed by an opaque session id
//! - Crash recovery from the persisted session record
//! - Bounded stop that only succeeds once every row is on disk
//! - Deterministic duplicate-start policy
//! - Event stream for state changes, flushes, rate windows and faults

pub mod recording;
pub mod service;
pub mod types;

pub use recording::RecordingSession;
pub use service::{RecorderService, RecorderServiceBuilder, TickerFactory};
pub use types::{
    validate_session_id, EventBus, FaultReport, RecorderEvent, SessionInfo, SessionState,
    StartOutcome, StartRequest, StopOutcome,
};

//! Session persistence
//!
//! - [`row`] - fixed-precision row encoding and the file header
//! - [`buffer`] - bounded in-memory row buffer
//! - [`sink`] - append-only session file with header-once and write recovery
//! - [`log`] - buffer and sink combined, with row accounting
//! - [`state`] - durable record of the active session for crash recovery

pub mod buffer;
pub mod log;
pub mod row;
pub mod sink;
pub mod state;

pub use buffer::RecordBuffer;
pub use log::{AppendOutcome, FlushReport, SampleLog};
pub use row::{Row, HEADER};
pub use sink::{FsLogOpener, LogFile, LogOpener, PersistentSink, WriteOutcome};
pub use state::{SessionRecord, SessionStateStore};

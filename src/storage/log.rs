//! Buffered session log
//!
//! [`SampleLog`] pairs a [`RecordBuffer`] with its [`PersistentSink`] and
//! keeps the row accounting for both. A full buffer is flushed
//! synchronously inside [`SampleLog::append`], so the append that fills the
//! buffer returns only after the batch is durable (or the write failed).

use crate::error::Result;
use crate::storage::buffer::RecordBuffer;
use crate::storage::row::{self, Row};
use crate::storage::sink::{PersistentSink, WriteOutcome};
use crate::types::Sample;
use std::path::Path;

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows moved from the buffer to the file
    pub rows: usize,
    /// Rows written to the file over the log's lifetime
    pub total_rows_written: u64,
    /// The sink had to be reinitialized to complete the write
    pub recovered: bool,
}

/// What happened to an appended row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Row is held in memory
    Buffered,
    /// Row filled the buffer and the whole batch was flushed
    Flushed(FlushReport),
}

/// Buffer and sink for one session
#[derive(Debug)]
pub struct SampleLog {
    buffer: RecordBuffer,
    sink: PersistentSink,
    rows_written: u64,
    flushes: u64,
    recovered_writes: u64,
}

impl SampleLog {
    pub fn new(sink: PersistentSink, buffer_capacity: usize) -> Self {
        Self {
            buffer: RecordBuffer::new(buffer_capacity),
            sink,
            rows_written: 0,
            flushes: 0,
            recovered_writes: 0,
        }
    }

    /// Encode and append a sample
    pub fn append_sample(&mut self, sample: &Sample) -> Result<AppendOutcome> {
        self.append(row::encode(sample))
    }

    /// Append an encoded row, flushing when the buffer fills
    ///
    /// On a failed flush the rows stay buffered and the error is returned.
    pub fn append(&mut self, row: Row) -> Result<AppendOutcome> {
        if self.buffer.push(row) {
            let report = self.flush()?;
            Ok(AppendOutcome::Flushed(report))
        } else {
            Ok(AppendOutcome::Buffered)
        }
    }

    /// Write every buffered row as one batch
    ///
    /// The buffer is only cleared after the sink confirms the write.
    pub fn flush(&mut self) -> Result<FlushReport> {
        if self.buffer.is_empty() {
            return Ok(FlushReport {
                rows: 0,
                total_rows_written: self.rows_written,
                recovered: false,
            });
        }

        let rows = self.buffer.len();
        let outcome = self.sink.write_batch(&self.buffer.batch())?;
        self.buffer.clear();

        self.rows_written += rows as u64;
        self.flushes += 1;
        let recovered = outcome == WriteOutcome::Recovered;
        if recovered {
            self.recovered_writes += 1;
        }

        tracing::debug!(
            rows,
            total = self.rows_written,
            recovered,
            "Flushed sample buffer"
        );
        Ok(FlushReport {
            rows,
            total_rows_written: self.rows_written,
            recovered,
        })
    }

    /// Flush what is left and release the file
    pub fn close(&mut self) -> Result<FlushReport> {
        let report = self.flush()?;
        self.sink.close()?;
        Ok(report)
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn rows_buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn recovered_writes(&self) -> u64 {
        self.recovered_writes
    }

    pub fn sink(&self) -> &PersistentSink {
        &self.sink
    }
}

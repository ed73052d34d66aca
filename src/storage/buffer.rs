//! Bounded in-memory write buffer

use crate::storage::row::Row;

/// Ordered rows awaiting a durable write
///
/// The buffer never evicts: it reports when it has reached capacity and the
/// owner is expected to flush. Rows are only removed by [`clear`](Self::clear)
/// after the owner has confirmed the write.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    rows: Vec<Row>,
    capacity: usize,
}

impl RecordBuffer {
    /// Create an empty buffer that asks for a flush at `capacity` rows
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one row; returns `true` when the buffer is now full
    pub fn push(&mut self, row: Row) -> bool {
        self.rows.push(row);
        self.is_full()
    }

    /// Whether a flush is due
    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    /// Rows held
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flush threshold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered rows in production order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Concatenate all rows into one contiguous batch
    pub fn batch(&self) -> String {
        let total: usize = self.rows.iter().map(String::len).sum();
        let mut out = String::with_capacity(total);
        for row in &self.rows {
            out.push_str(row);
        }
        out
    }

    /// Drop every row after a confirmed write
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

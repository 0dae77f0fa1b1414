//! Buffered, batch-committing record writer.
//!
//! Records are held in memory until the buffer reaches `buffer_size` or
//! [`BufferedWriter::flush`] is called. A flush appends the whole batch inside
//! one [`AppendOnlyGuard`](crate::AppendOnlyGuard) transaction: either every
//! record of the batch lands or none does, and a failed batch goes back to the
//! front of the buffer.

use crate::container::RecordContainer;
use medledger_core::{observe, Record, Result, WriterConfig};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

pub struct BufferedWriter<R: Record> {
    container: Arc<RecordContainer>,
    config: WriterConfig,
    buffer: Mutex<Vec<R>>,
    // Serializes flushes so batches commit in the order they were taken.
    flush_lock: Mutex<()>,
    closed: bool,
}

impl<R: Record> BufferedWriter<R> {
    pub fn new(container: Arc<RecordContainer>, config: WriterConfig) -> Self {
        Self {
            container,
            config,
            buffer: Mutex::new(Vec::new()),
            flush_lock: Mutex::new(()),
            closed: false,
        }
    }

    /// Buffer one record and return its identifier.
    ///
    /// Triggers a flush once the buffer holds `buffer_size` records. If that
    /// flush fails the error is returned and the record stays buffered.
    pub fn append(&self, record: R) -> Result<String> {
        let record_id = record.record_id().to_string();
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(record);
            buffer.len() >= self.config.buffer_size
        };
        if should_flush {
            self.flush()?;
        }
        Ok(record_id)
    }

    /// Records accepted but not yet committed
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Commit every buffered record. Returns how many were written.
    pub fn flush(&self) -> Result<usize> {
        let _flushing = self.flush_lock.lock();
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        match self.write_batch(&batch) {
            Ok(range) => {
                observe::record_flush(R::section(), batch.len(), started.elapsed());
                tracing::debug!(
                    target: "medledger::storage",
                    section = R::section(),
                    records = batch.len(),
                    first_index = range.start,
                    "Flushed batch"
                );
                Ok(batch.len())
            }
            Err(e) => {
                let mut buffer = self.buffer.lock();
                let newer = std::mem::replace(&mut *buffer, batch);
                buffer.extend(newer);
                tracing::error!(
                    target: "medledger::storage",
                    section = R::section(),
                    pending = buffer.len(),
                    "Flush failed, batch kept for retry: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn write_batch(&self, batch: &[R]) -> Result<Range<u64>> {
        let rows: Vec<_> = batch.iter().map(|r| r.to_columns()).collect();
        let mut guard = self.container.begin_append()?;
        let range = guard.append_rows(R::section(), &rows)?;
        guard.commit()?;
        Ok(range)
    }

    /// Read-only structural check of the backing file
    pub fn verify_integrity(&self) -> bool {
        RecordContainer::verify_integrity(self.container.path())
    }

    /// Flush and release the writer.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush().map(|_| ())
    }
}

impl<R: Record> Drop for BufferedWriter<R> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!(
                target: "medledger::storage",
                section = R::section(),
                "Failed to flush writer on drop: {}",
                e
            );
        }
    }
}

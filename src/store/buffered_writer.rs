//! Buffered batch writer
//!
//! Collects records and hands them to a `BatchStore` in groups of `batch_size`.
//! Failed flushes keep their records for the next attempt; once more than
//! `max_pending` are retained the overflow policy decides what is lost.

use super::writer_backend::{BatchStore, StoreError};
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub enum WriterError {
    Store(StoreError),
    Closed,
}

impl From<StoreError> for WriterError {
    fn from(err: StoreError) -> Self {
        WriterError::Store(err)
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Store(e) => write!(f, "Store error: {}", e),
            WriterError::Closed => write!(f, "Writer already closed"),
        }
    }
}

impl std::error::Error for WriterError {}

/// Which records to give up when retained records exceed the hard cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop_oldest" | "oldest" => Ok(OverflowPolicy::DropOldest),
            "drop_newest" | "newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriterSettings {
    pub batch_size: usize,
    pub max_pending: usize,
    pub overflow_policy: OverflowPolicy,
    /// Longest a partial batch may wait before a timed flush
    pub flush_interval: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_pending: 1_000,
            overflow_policy: OverflowPolicy::DropOldest,
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl From<&crate::config::PipelineConfig> for WriterSettings {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_pending: config.max_pending_records,
            overflow_policy: config.overflow_policy,
            flush_interval: config.flush_interval(),
        }
    }
}

/// Single-producer batching writer over any `BatchStore`
pub struct BufferedWriter<S, R> {
    store: Option<S>,
    pending: Vec<R>,
    batch_size: usize,
    max_pending: usize,
    overflow_policy: OverflowPolicy,
    flush_interval: Duration,
    flushed_total: u64,
    dropped_total: u64,
    _record: PhantomData<fn(R)>,
}

impl<S, R> BufferedWriter<S, R>
where
    S: BatchStore<R>,
    R: Send + Sync,
{
    pub fn new(store: S, settings: WriterSettings) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            store: Some(store),
            pending: Vec::with_capacity(batch_size),
            batch_size,
            max_pending: settings.max_pending.max(batch_size),
            overflow_policy: settings.overflow_policy,
            flush_interval: settings.flush_interval,
            flushed_total: 0,
            dropped_total: 0,
            _record: PhantomData,
        }
    }

    /// Append a record, flushing once a full batch is pending
    ///
    /// A failed implicit flush is reported, but the record stays queued.
    pub async fn enqueue(&mut self, record: R) -> Result<(), WriterError> {
        if self.store.is_none() {
            return Err(WriterError::Closed);
        }

        self.pending.push(record);

        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    /// Write all pending records in one batch
    pub async fn flush(&mut self) -> Result<(), WriterError> {
        let store = self.store.as_mut().ok_or(WriterError::Closed)?;

        if self.pending.is_empty() {
            return Ok(());
        }

        match store.insert_batch(&self.pending).await {
            Ok(()) => {
                log::debug!(
                    "✅ Flushed {} records to {}",
                    self.pending.len(),
                    store.backend_type()
                );
                self.flushed_total += self.pending.len() as u64;
                self.pending.clear();
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "⚠️  Batch flush to {} failed, retaining {} records: {}",
                    store.backend_type(),
                    self.pending.len(),
                    e
                );
                self.enforce_cap();
                Err(WriterError::Store(e))
            }
        }
    }

    /// Final best-effort flush, then release the store
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn close(&mut self) -> Result<(), WriterError> {
        if self.store.is_none() {
            return Ok(());
        }

        let flush_result = self.flush().await;
        if flush_result.is_err() && !self.pending.is_empty() {
            log::error!(
                "❌ Closing with {} unflushed records, they are lost",
                self.pending.len()
            );
            self.dropped_total += self.pending.len() as u64;
            self.pending.clear();
        }

        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.close().await {
                log::warn!("⚠️  Failed to close {} store: {}", store.backend_type(), e);
            }
            log::info!(
                "🔒 Writer closed ({}): {} flushed, {} dropped",
                store.backend_type(),
                self.flushed_total,
                self.dropped_total
            );
        }

        flush_result
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flushed_total(&self) -> u64 {
        self.flushed_total
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    fn enforce_cap(&mut self) {
        if self.pending.len() <= self.max_pending {
            return;
        }

        let excess = self.pending.len() - self.max_pending;
        match self.overflow_policy {
            OverflowPolicy::DropOldest => {
                self.pending.drain(..excess);
            }
            OverflowPolicy::DropNewest => {
                self.pending.truncate(self.max_pending);
            }
        }
        self.dropped_total += excess as u64;

        log::error!(
            "❌ DATA LOSS: dropped {} records ({:?}), {} retained, {} dropped in total",
            excess,
            self.overflow_policy,
            self.pending.len(),
            self.dropped_total
        );
    }
}

//! Capture runtime: shared aggregator handle plus its background tasks
//!
//! ```text
//! input source ──on_sample/on_action──┐
//!                                     ├─> CaptureHandle (one lock) ──mpsc──> run_capture_writer ─> BufferedWriter
//! run_idle_checker ──on_idle_check────┘
//! ```
//!
//! Records are sent while the lock is held, so the channel carries them in emission order.
//! The send never blocks and store I/O happens only in the writer task.

use super::aggregator::SegmentAggregator;
use super::types::{ActionEvent, CaptureRecord, RawEvent, Timestamp};
use crate::store::{BatchStore, BufferedWriter};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Cloneable handle to one aggregator instance
#[derive(Clone)]
pub struct CaptureHandle {
    aggregator: Arc<Mutex<SegmentAggregator>>,
    tx: mpsc::UnboundedSender<CaptureRecord>,
}

impl CaptureHandle {
    pub fn new(inactivity_threshold: Duration) -> (Self, mpsc::UnboundedReceiver<CaptureRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            aggregator: Arc::new(Mutex::new(SegmentAggregator::new(inactivity_threshold))),
            tx,
        };
        (handle, rx)
    }

    fn lock(&self) -> MutexGuard<'_, SegmentAggregator> {
        // A panicked holder leaves plain data behind; keep capturing
        self.aggregator.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn forward(&self, records: impl IntoIterator<Item = CaptureRecord>) {
        for record in records {
            if self.tx.send(record).is_err() {
                log::warn!("⚠️  Capture writer gone, dropping record");
                return;
            }
        }
    }

    pub fn on_sample(&self, x: f64, y: f64, t: Timestamp) {
        self.lock().on_sample(x, y, t);
    }

    pub fn on_action(&self, action: ActionEvent) {
        let mut aggregator = self.lock();
        let emitted = aggregator.on_action(action);
        self.forward(emitted);
    }

    /// Returns whether a segment was closed
    pub fn on_idle_check(&self, now: Timestamp) -> bool {
        let mut aggregator = self.lock();
        let closed = aggregator.on_idle_check(now);
        let emitted = closed.is_some();
        self.forward(closed.map(CaptureRecord::Movement));
        emitted
    }

    /// Force-close any open segment
    pub fn finalize(&self) -> bool {
        let mut aggregator = self.lock();
        let closed = aggregator.finalize_now();
        let emitted = closed.is_some();
        self.forward(closed.map(CaptureRecord::Movement));
        emitted
    }

    pub fn handle_event(&self, event: RawEvent) {
        match event {
            RawEvent::Move(sample) => self.on_sample(sample.x, sample.y, sample.timestamp),
            RawEvent::Action(action) => self.on_action(action),
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }
}

/// Periodic idle check; finalizes any open segment once shutdown is signalled
pub async fn run_idle_checker(
    handle: CaptureHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if handle.on_idle_check(Utc::now()) {
                    log::debug!("Idle segment closed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if handle.finalize() {
        log::info!("🧹 Finalized in-progress segment on shutdown");
    }
}

/// Drain capture records into the writer until every handle is dropped
///
/// A partial batch (or one retained after a failed flush) is flushed once per
/// flush interval. Returns the closed writer so callers can inspect its counters.
pub async fn run_capture_writer<S>(
    mut rx: mpsc::UnboundedReceiver<CaptureRecord>,
    mut writer: BufferedWriter<S, CaptureRecord>,
) -> BufferedWriter<S, CaptureRecord>
where
    S: BatchStore<CaptureRecord>,
{
    log::info!(
        "🚀 Capture writer started (batch size: {}, flush interval: {}ms)",
        writer.batch_size(),
        writer.flush_interval().as_millis()
    );

    let mut flush_timer = tokio::time::interval(writer.flush_interval());
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            record = rx.recv() => match record {
                Some(record) => {
                    if let Err(e) = writer.enqueue(record).await {
                        log::error!("❌ Capture flush failed: {}", e);
                    }
                }
                None => break,
            },
            _ = flush_timer.tick() => {
                if writer.pending_len() > 0 {
                    if let Err(e) = writer.flush().await {
                        log::error!("❌ Timed capture flush failed: {}", e);
                    }
                }
            }
        }
    }

    if let Err(e) = writer.close().await {
        log::error!("❌ Final capture flush failed: {}", e);
    }

    log::info!(
        "✅ Capture writer stopped: {} records flushed, {} dropped",
        writer.flushed_total(),
        writer.dropped_total()
    );
    writer
}

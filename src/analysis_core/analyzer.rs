//! Incremental analyzer with a (timestamp, id) watermark
//!
//! Each poll cycle moves through three states:
//!
//! ```text
//! Idle ──(newest (timestamp, id) beyond what was drained)──> Draining ──(batch flushed)──> Advancing ──> Idle
//!   ^                                                    │
//!   └────────────(store or flush failure, watermark untouched)─┘
//! ```
//!
//! Only movements with a successor in timestamp order get analyzed; the newest one is
//! deferred because its delta is not known yet. The watermark moves to the last settled
//! movement after the writer has flushed, never before.

use super::kinematics::Kinematics;
use super::record::AnalysisRecord;
use crate::config::PipelineConfig;
use crate::store::{
    BatchStore, BufferedWriter, MovementSource, StoreError, Watermark, WriterError,
};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;

/// Upper bound on movements fetched per drain
pub const MOVEMENT_FETCH_LIMIT: usize = 1000;

#[derive(Debug)]
pub enum AnalyzerError {
    Store(StoreError),
    Writer(WriterError),
}

impl From<StoreError> for AnalyzerError {
    fn from(err: StoreError) -> Self {
        AnalyzerError::Store(err)
    }
}

impl From<WriterError> for AnalyzerError {
    fn from(err: WriterError) -> Self {
        AnalyzerError::Writer(err)
    }
}

impl std::fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyzerError::Store(e) => write!(f, "Store error: {}", e),
            AnalyzerError::Writer(e) => write!(f, "Writer error: {}", e),
        }
    }
}

impl std::error::Error for AnalyzerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Idle,
    Draining,
    Advancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new in the store
    Idle,
    /// Store max went backwards (e.g. the table was reset); watermark kept
    Regressed,
    Drained {
        analyzed: usize,
        skipped: usize,
        deferred: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerSettings {
    pub min_dt: f64,
    pub poll_interval: Duration,
    pub backoff_interval: Duration,
    pub fetch_limit: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            min_dt: super::kinematics::DEFAULT_MIN_DT,
            poll_interval: Duration::from_secs(1),
            backoff_interval: Duration::from_secs(5),
            fetch_limit: MOVEMENT_FETCH_LIMIT,
        }
    }
}

impl From<&PipelineConfig> for AnalyzerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_dt: config.min_dt_floor_secs,
            poll_interval: config.poll_interval(),
            backoff_interval: config.backoff_interval(),
            fetch_limit: MOVEMENT_FETCH_LIMIT,
        }
    }
}

pub struct IncrementalAnalyzer<Q, S> {
    source: Q,
    writer: BufferedWriter<S, AnalysisRecord>,
    settings: AnalyzerSettings,
    state: AnalyzerState,
    watermark: Option<Watermark>,
    /// Newest store position at the last drain that reached the end of the table
    drained_max: Option<Watermark>,
}

impl<Q, S> IncrementalAnalyzer<Q, S>
where
    Q: MovementSource + Send,
    S: BatchStore<AnalysisRecord>,
{
    pub fn new(source: Q, writer: BufferedWriter<S, AnalysisRecord>, settings: AnalyzerSettings) -> Self {
        Self {
            source,
            writer,
            // A page of two always settles at least one row
            settings: AnalyzerSettings {
                fetch_limit: settings.fetch_limit.max(2),
                ..settings
            },
            state: AnalyzerState::Idle,
            watermark: None,
            drained_max: None,
        }
    }

    /// Start from the newest movement that already has an analysis row
    pub fn resume_from_store(&mut self) -> Result<Option<Watermark>, StoreError> {
        if let Some(stored) = self.source.last_analyzed_watermark()? {
            if self.watermark.map_or(true, |current| stored > current) {
                log::info!(
                    "📥 Resuming analyzer from movement id={} ({})",
                    stored.id,
                    stored.timestamp
                );
                self.watermark = Some(stored);
            }
        }
        Ok(self.watermark)
    }

    pub fn watermark(&self) -> Option<Watermark> {
        self.watermark
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn writer(&self) -> &BufferedWriter<S, AnalysisRecord> {
        &self.writer
    }

    /// Run one Idle/Draining/Advancing cycle
    ///
    /// On error the watermark is exactly what it was before the call.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, AnalyzerError> {
        self.state = AnalyzerState::Idle;

        let newest = match self.source.newest_movement()? {
            Some(position) => position,
            None => return Ok(PollOutcome::Idle),
        };

        // Compare full (timestamp, id) positions so a tie on timestamp still counts as new
        let seen = self.watermark.max(self.drained_max);
        if let Some(seen) = seen {
            if newest < seen {
                log::warn!(
                    "⚠️  Newest movement {:?} is behind watermark {:?}, skipping cycle",
                    newest,
                    seen
                );
                return Ok(PollOutcome::Regressed);
            }
            if newest == seen {
                return Ok(PollOutcome::Idle);
            }
        }

        self.state = AnalyzerState::Draining;
        let outcome = self.drain(newest).await;
        self.state = AnalyzerState::Idle;
        outcome
    }

    async fn drain(&mut self, newest: Watermark) -> Result<PollOutcome, AnalyzerError> {
        // Records retained from a failed cycle go first so retries do not pile up duplicates
        if self.writer.pending_len() > 0 {
            self.writer.flush().await?;
        }

        let rows = self
            .source
            .movements_after(self.watermark, self.settings.fetch_limit)?;
        let truncated = rows.len() >= self.settings.fetch_limit;

        log::debug!(
            "🚀 Draining {} movements after {:?} (newest {:?})",
            rows.len(),
            self.watermark,
            newest
        );

        let computed_at = Utc::now();
        let mut settled: Option<Watermark> = None;
        let (mut analyzed, mut skipped, mut deferred) = (0, 0, 0);

        for row in &rows {
            let Some(delta) = row.delta_to_next_secs else {
                // Newest movement: its segment gap is unknown until the next one lands
                deferred += 1;
                continue;
            };

            let kinematics = Kinematics::compute(&row.displacement, delta, self.settings.min_dt);
            settled = Some(row.watermark());

            if kinematics.is_stationary() {
                log::trace!("Movement {} has no displacement, skipping", row.id);
                skipped += 1;
                continue;
            }

            self.writer
                .enqueue(AnalysisRecord::new(row, kinematics, computed_at))
                .await?;
            analyzed += 1;
        }

        self.writer.flush().await?;

        self.state = AnalyzerState::Advancing;
        if let Some(w) = settled {
            self.watermark = Some(w);
        }
        if !truncated {
            self.drained_max = Some(newest);
        }

        Ok(PollOutcome::Drained {
            analyzed,
            skipped,
            deferred,
        })
    }

    /// Poll until `shutdown` flips to true, then close the writer
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "📊 Analyzer running (poll: {}ms, backoff: {}ms, min dt: {}s)",
            self.settings.poll_interval.as_millis(),
            self.settings.backoff_interval.as_millis(),
            self.settings.min_dt
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.poll_once().await {
                Ok(PollOutcome::Drained {
                    analyzed,
                    skipped,
                    deferred,
                }) => {
                    if analyzed > 0 || skipped > 0 {
                        log::info!(
                            "✅ Analyzed {} movements ({} stationary skipped, {} deferred), watermark {:?}",
                            analyzed,
                            skipped,
                            deferred,
                            self.watermark.map(|w| w.id)
                        );
                        Duration::ZERO
                    } else {
                        // Only the deferred tail was seen; wait for new data
                        self.settings.poll_interval
                    }
                }
                Ok(PollOutcome::Idle) | Ok(PollOutcome::Regressed) => self.settings.poll_interval,
                Err(e) => {
                    log::error!(
                        "❌ Analysis cycle failed, retrying in {}ms: {}",
                        self.settings.backoff_interval.as_millis(),
                        e
                    );
                    self.settings.backoff_interval
                }
            };

            if pause.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.writer.close().await {
            log::error!("❌ Final analysis flush failed: {}", e);
        }
        log::info!("✅ Analyzer stopped at watermark {:?}", self.watermark);
    }
}

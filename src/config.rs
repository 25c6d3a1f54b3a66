//! Pipeline configuration from environment variables

use crate::store::OverflowPolicy;
use std::env;
use std::time::Duration;

/// Configuration for capture and analysis runtimes
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Idle time after which an in-progress segment is closed (milliseconds)
    pub inactivity_threshold_ms: u64,

    /// Cadence of the capture idle check (milliseconds)
    pub idle_check_interval_ms: u64,

    /// Records per batch insert
    pub batch_size: usize,

    /// Longest a partial batch waits before a timed flush (milliseconds)
    pub flush_interval_ms: u64,

    /// Hard cap on records retained after failed flushes
    pub max_pending_records: usize,

    /// Which records to drop once the hard cap is exceeded
    pub overflow_policy: OverflowPolicy,

    /// Analyzer poll interval when no new movements exist (milliseconds)
    pub poll_interval_ms: u64,

    /// Analyzer sleep after a store failure (milliseconds)
    pub backoff_interval_ms: u64,

    /// Minimum elapsed time used for kinematics (seconds)
    pub min_dt_floor_secs: f64,

    /// Start the analyzer watermark from rows already present in the analysis table
    pub resume_from_store: bool,

    /// Number of recent analysis rows in the speed summary
    pub speed_window: usize,

    /// Cadence of the speed summary log line (milliseconds, 0 disables it)
    pub speed_report_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: "data/kineflow.db".to_string(),
            inactivity_threshold_ms: 1_000,
            idle_check_interval_ms: 500,
            batch_size: 10,
            flush_interval_ms: 1_000,
            max_pending_records: 1_000,
            overflow_policy: OverflowPolicy::DropOldest,
            poll_interval_ms: 1_000,
            backoff_interval_ms: 5_000,
            min_dt_floor_secs: 0.01,
            resume_from_store: false,
            speed_window: 100,
            speed_report_interval_ms: 10_000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `KINEFLOW_DB_PATH` (default: data/kineflow.db)
    /// - `INACTIVITY_THRESHOLD_MS` (default: 1000)
    /// - `IDLE_CHECK_INTERVAL_MS` (default: 500)
    /// - `BATCH_SIZE` (default: 10)
    /// - `FLUSH_INTERVAL_MS` (default: 1000)
    /// - `MAX_PENDING_RECORDS` (default: 1000)
    /// - `OVERFLOW_POLICY` (default: drop_oldest)
    /// - `POLL_INTERVAL_MS` (default: 1000)
    /// - `BACKOFF_INTERVAL_MS` (default: 5000)
    /// - `MIN_DT_FLOOR_SECS` (default: 0.01)
    /// - `ANALYZER_RESUME_FROM_STORE` (default: false)
    /// - `SPEED_WINDOW` (default: 100)
    /// - `SPEED_REPORT_INTERVAL_MS` (default: 10000, 0 disables)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let parse = |key: &str| -> Option<String> {
            lookup(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };

        fn or_default<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
            match raw {
                Some(value) => value.parse().unwrap_or_else(|_| {
                    log::warn!("⚠️  Ignoring invalid {}={:?}, using default", key, value);
                    default
                }),
                None => default,
            }
        }

        let batch_size: usize = or_default("BATCH_SIZE", parse("BATCH_SIZE"), defaults.batch_size).max(1);
        let max_pending_records: usize = or_default(
            "MAX_PENDING_RECORDS",
            parse("MAX_PENDING_RECORDS"),
            defaults.max_pending_records,
        )
        .max(batch_size);

        let min_dt_floor_secs: f64 = or_default(
            "MIN_DT_FLOOR_SECS",
            parse("MIN_DT_FLOOR_SECS"),
            defaults.min_dt_floor_secs,
        );
        let min_dt_floor_secs = if min_dt_floor_secs.is_finite() && min_dt_floor_secs > 0.0 {
            min_dt_floor_secs
        } else {
            log::warn!("⚠️  MIN_DT_FLOOR_SECS must be positive, using {}", defaults.min_dt_floor_secs);
            defaults.min_dt_floor_secs
        };

        Self {
            db_path: parse("KINEFLOW_DB_PATH").unwrap_or(defaults.db_path),
            inactivity_threshold_ms: or_default(
                "INACTIVITY_THRESHOLD_MS",
                parse("INACTIVITY_THRESHOLD_MS"),
                defaults.inactivity_threshold_ms,
            ),
            idle_check_interval_ms: or_default(
                "IDLE_CHECK_INTERVAL_MS",
                parse("IDLE_CHECK_INTERVAL_MS"),
                defaults.idle_check_interval_ms,
            )
            .max(1),
            batch_size,
            flush_interval_ms: or_default(
                "FLUSH_INTERVAL_MS",
                parse("FLUSH_INTERVAL_MS"),
                defaults.flush_interval_ms,
            )
            .max(1),
            max_pending_records,
            overflow_policy: or_default(
                "OVERFLOW_POLICY",
                parse("OVERFLOW_POLICY"),
                defaults.overflow_policy,
            ),
            poll_interval_ms: or_default(
                "POLL_INTERVAL_MS",
                parse("POLL_INTERVAL_MS"),
                defaults.poll_interval_ms,
            )
            .max(1),
            backoff_interval_ms: or_default(
                "BACKOFF_INTERVAL_MS",
                parse("BACKOFF_INTERVAL_MS"),
                defaults.backoff_interval_ms,
            ),
            min_dt_floor_secs,
            resume_from_store: or_default(
                "ANALYZER_RESUME_FROM_STORE",
                parse("ANALYZER_RESUME_FROM_STORE"),
                defaults.resume_from_store,
            ),
            speed_window: or_default("SPEED_WINDOW", parse("SPEED_WINDOW"), defaults.speed_window).max(1),
            speed_report_interval_ms: or_default(
                "SPEED_REPORT_INTERVAL_MS",
                parse("SPEED_REPORT_INTERVAL_MS"),
                defaults.speed_report_interval_ms,
            ),
        }
    }

    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_millis(self.inactivity_threshold_ms)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }

    pub fn speed_report_interval(&self) -> Option<Duration> {
        (self.speed_report_interval_ms > 0).then(|| Duration::from_millis(self.speed_report_interval_ms))
    }
}

//! SQLite implementation of the store boundary
//!
//! Three append-only tables:
//! - `mouse_movements` - closed movement segments (four directional displacement fields)
//! - `mouse_clicks` - press/release actions with pointer position
//! - `mouse_analysis` - one kinematics row per analyzed movement, unique on `movement_id`
//!
//! Timestamps are stored as integer microseconds since the Unix epoch.

use super::writer_backend::{
    BatchStore, MovementSource, PersistedMovement, StoreError, Watermark,
};
use crate::analysis_core::kinematics::DirectionalRates;
use crate::analysis_core::record::AnalysisRecord;
use crate::capture_core::types::{
    ActionEvent, CaptureRecord, Displacement, MovementSegment, Timestamp,
};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const INSERT_MOVEMENT_SQL: &str = "INSERT INTO mouse_movements
     (timestamp_us, disp_right, disp_left, disp_up, disp_down, samples)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const INSERT_CLICK_SQL: &str = "INSERT INTO mouse_clicks (timestamp_us, button, action, x, y)
     VALUES (?1, ?2, ?3, ?4, ?5)";

const INSERT_ANALYSIS_SQL: &str = "INSERT OR IGNORE INTO mouse_analysis
     (movement_id, movement_ts_us, elapsed_secs,
      vel_right, vel_left, vel_up, vel_down, vel_euclidean,
      acc_right, acc_left, acc_up, acc_down, acc_euclidean, computed_at_us)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

fn to_micros(ts: Timestamp) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(us: i64) -> rusqlite::Result<Timestamp> {
    DateTime::from_timestamp_micros(us).ok_or(rusqlite::Error::IntegralValueOutOfRange(1, us))
}

pub struct SqliteStore {
    conn: Option<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database and its tables
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Connection(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&path)
            .map_err(|e| StoreError::Connection(format!("{}: {}", path.display(), e)))?;

        apply_optimized_pragmas(&conn)?;
        Self::ensure_tables(&conn)?;

        log::info!("✅ SQLite store ready: {}", path.display());

        Ok(Self {
            conn: Some(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mouse_movements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_us INTEGER NOT NULL,
                disp_right REAL NOT NULL CHECK (disp_right >= 0),
                disp_left REAL NOT NULL CHECK (disp_left >= 0),
                disp_up REAL NOT NULL CHECK (disp_up >= 0),
                disp_down REAL NOT NULL CHECK (disp_down >= 0),
                samples INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_movements_ts_id ON mouse_movements(timestamp_us, id);

            CREATE TABLE IF NOT EXISTS mouse_clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_us INTEGER NOT NULL,
                button TEXT NOT NULL,
                action TEXT NOT NULL CHECK (action IN ('press', 'release')),
                x REAL NOT NULL,
                y REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clicks_ts ON mouse_clicks(timestamp_us);

            CREATE TABLE IF NOT EXISTS mouse_analysis (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                movement_id INTEGER NOT NULL UNIQUE REFERENCES mouse_movements(id),
                movement_ts_us INTEGER NOT NULL,
                elapsed_secs REAL NOT NULL,
                vel_right REAL NOT NULL,
                vel_left REAL NOT NULL,
                vel_up REAL NOT NULL,
                vel_down REAL NOT NULL,
                vel_euclidean REAL NOT NULL,
                acc_right REAL NOT NULL,
                acc_left REAL NOT NULL,
                acc_up REAL NOT NULL,
                acc_down REAL NOT NULL,
                acc_euclidean REAL NOT NULL,
                computed_at_us INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_movement_ts ON mouse_analysis(movement_ts_us, movement_id);",
        )
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::Connection("store connection already closed".to_string()))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::Connection("store connection already closed".to_string()))
    }

    /// Insert a single movement segment, returning its id
    pub fn insert_movement(&self, segment: &MovementSegment) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Self::execute_movement(conn, segment)?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a single action event, returning its id
    pub fn insert_action(&self, action: &ActionEvent) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Self::execute_click(conn, action)?;
        Ok(conn.last_insert_rowid())
    }

    fn execute_movement(conn: &Connection, segment: &MovementSegment) -> rusqlite::Result<usize> {
        let d = &segment.displacement;
        conn.prepare_cached(INSERT_MOVEMENT_SQL)?.execute(params![
            to_micros(segment.end_timestamp),
            d.right,
            d.left,
            d.up,
            d.down,
            segment.samples,
        ])
    }

    fn execute_click(conn: &Connection, action: &ActionEvent) -> rusqlite::Result<usize> {
        conn.prepare_cached(INSERT_CLICK_SQL)?.execute(params![
            to_micros(action.timestamp),
            action.button,
            action.phase.as_str(),
            action.x,
            action.y,
        ])
    }

    fn execute_analysis(conn: &Connection, record: &AnalysisRecord) -> rusqlite::Result<usize> {
        let v = &record.velocity;
        let a = &record.acceleration;
        conn.prepare_cached(INSERT_ANALYSIS_SQL)?.execute(params![
            record.movement_id,
            to_micros(record.movement_timestamp),
            record.elapsed_secs,
            v.right,
            v.left,
            v.up,
            v.down,
            v.euclidean,
            a.right,
            a.left,
            a.up,
            a.down,
            a.euclidean,
            to_micros(record.computed_at),
        ])
    }

    fn write_capture_batch(&mut self, records: &[CaptureRecord]) -> Result<(), StoreError> {
        let tx = self.conn_mut()?.transaction()?;
        for record in records {
            match record {
                CaptureRecord::Movement(segment) => Self::execute_movement(&tx, segment)?,
                CaptureRecord::Action(action) => Self::execute_click(&tx, action)?,
            };
        }
        tx.commit()?;
        Ok(())
    }

    fn write_analysis_batch(&mut self, records: &[AnalysisRecord]) -> Result<usize, StoreError> {
        let tx = self.conn_mut()?.transaction()?;
        let mut inserted = 0;
        for record in records {
            inserted += Self::execute_analysis(&tx, record)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn movement_count(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM mouse_movements")
    }

    pub fn click_count(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM mouse_clicks")
    }

    pub fn analysis_count(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM mouse_analysis")
    }

    fn count(&self, sql: &str) -> Result<i64, StoreError> {
        Ok(self.conn()?.query_row(sql, [], |row| row.get(0))?)
    }

    /// Euclidean velocities of the newest `limit` analysis rows, newest first
    pub fn recent_euclidean_velocities(&self, limit: usize) -> Result<Vec<f64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT vel_euclidean FROM mouse_analysis
             ORDER BY movement_ts_us DESC, movement_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| row.get::<_, f64>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Analysis row for one movement, if it exists
    pub fn analysis_for(&self, movement_id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT movement_id, movement_ts_us, elapsed_secs,
                        vel_right, vel_left, vel_up, vel_down, vel_euclidean,
                        acc_right, acc_left, acc_up, acc_down, acc_euclidean, computed_at_us
                 FROM mouse_analysis WHERE movement_id = ?1",
                [movement_id],
                |row| {
                    Ok(AnalysisRecord {
                        movement_id: row.get(0)?,
                        movement_timestamp: from_micros(row.get(1)?)?,
                        elapsed_secs: row.get(2)?,
                        velocity: DirectionalRates {
                            right: row.get(3)?,
                            left: row.get(4)?,
                            up: row.get(5)?,
                            down: row.get(6)?,
                            euclidean: row.get(7)?,
                        },
                        acceleration: DirectionalRates {
                            right: row.get(8)?,
                            left: row.get(9)?,
                            up: row.get(10)?,
                            down: row.get(11)?,
                            euclidean: row.get(12)?,
                        },
                        computed_at: from_micros(row.get(13)?)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Close the connection; later calls fail with `StoreError::Connection`
    pub fn close_connection(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Database(e))?;
            log::debug!("🔒 SQLite connection closed: {}", self.path.display());
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore<CaptureRecord> for SqliteStore {
    async fn insert_batch(&mut self, records: &[CaptureRecord]) -> Result<(), StoreError> {
        self.write_capture_batch(records)?;
        log::debug!("✅ Wrote {} capture records to SQLite", records.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.close_connection()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[async_trait]
impl BatchStore<AnalysisRecord> for SqliteStore {
    async fn insert_batch(&mut self, records: &[AnalysisRecord]) -> Result<(), StoreError> {
        let inserted = self.write_analysis_batch(records)?;
        if inserted < records.len() {
            log::debug!(
                "Ignored {} already-analyzed movements",
                records.len() - inserted
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.close_connection()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

impl MovementSource for SqliteStore {
    fn newest_movement(&self) -> Result<Option<Watermark>, StoreError> {
        let row: Option<(i64, i64)> = self
            .conn()?
            .query_row(
                "SELECT timestamp_us, id FROM mouse_movements
                 ORDER BY timestamp_us DESC, id DESC
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((ts_us, id)) => Ok(Some(Watermark {
                timestamp: from_micros(ts_us)?,
                id,
            })),
            None => Ok(None),
        }
    }

    fn movements_after(
        &self,
        after: Option<Watermark>,
        limit: usize,
    ) -> Result<Vec<PersistedMovement>, StoreError> {
        let (after_ts, after_id) = match after {
            Some(w) => (to_micros(w.timestamp), w.id),
            None => (i64::MIN, i64::MIN),
        };

        let conn = self.conn()?;
        // LEAD runs before LIMIT, so the last row of a truncated page still sees its successor
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp_us, disp_right, disp_left, disp_up, disp_down,
                    LEAD(timestamp_us) OVER (ORDER BY timestamp_us, id) - timestamp_us AS delta_us
             FROM mouse_movements
             WHERE timestamp_us > ?1 OR (timestamp_us = ?1 AND id > ?2)
             ORDER BY timestamp_us ASC, id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![after_ts, after_id, limit as i64], |row| {
            let delta_us: Option<i64> = row.get(6)?;
            Ok(PersistedMovement {
                id: row.get(0)?,
                timestamp: from_micros(row.get(1)?)?,
                displacement: Displacement {
                    right: row.get(2)?,
                    left: row.get(3)?,
                    up: row.get(4)?,
                    down: row.get(5)?,
                },
                delta_to_next_secs: delta_us.map(|us| us as f64 / 1_000_000.0),
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn last_analyzed_watermark(&self) -> Result<Option<Watermark>, StoreError> {
        let row: Option<(i64, i64)> = self
            .conn()?
            .query_row(
                "SELECT movement_ts_us, movement_id FROM mouse_analysis
                 ORDER BY movement_ts_us DESC, movement_id DESC
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((ts_us, id)) => Ok(Some(Watermark {
                timestamp: from_micros(ts_us)?,
                id,
            })),
            None => Ok(None),
        }
    }
}

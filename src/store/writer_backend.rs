use crate::capture_core::types::{Displacement, Timestamp};
use async_trait::async_trait;

#[derive(Debug)]
pub enum StoreError {
    /// Store unreachable or connection already released
    Connection(String),
    Database(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connection(e) => write!(f, "Connection error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Backend trait for all-or-nothing batch inserts of one record shape
#[async_trait]
pub trait BatchStore<R: Sync>: Send {
    /// Insert every record in a single transaction
    async fn insert_batch(&mut self, records: &[R]) -> Result<(), StoreError>;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Position in the movement table: ordered by timestamp, ties broken by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub timestamp: Timestamp,
    pub id: i64,
}

/// A stored movement segment plus the gap to the next one in timestamp order
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedMovement {
    pub id: i64,
    pub timestamp: Timestamp,
    pub displacement: Displacement,
    /// Seconds until the next movement; `None` for the newest row
    pub delta_to_next_secs: Option<f64>,
}

impl PersistedMovement {
    pub fn watermark(&self) -> Watermark {
        Watermark {
            timestamp: self.timestamp,
            id: self.id,
        }
    }
}

/// Read side of the store used by the incremental analyzer
pub trait MovementSource {
    /// Position of the newest movement record (latest timestamp, highest id among ties)
    fn newest_movement(&self) -> Result<Option<Watermark>, StoreError>;

    /// Movements strictly after `after` (all rows if `None`), ascending, at most `limit`
    fn movements_after(
        &self,
        after: Option<Watermark>,
        limit: usize,
    ) -> Result<Vec<PersistedMovement>, StoreError>;

    /// Newest movement that already has an analysis row
    fn last_analyzed_watermark(&self) -> Result<Option<Watermark>, StoreError>;
}

//! Store boundary
//!
//! ```text
//! CaptureRecord ─┐                              ┌─> mouse_movements / mouse_clicks
//!                ├─> BufferedWriter ─> BatchStore
//! AnalysisRecord ┘                              └─> mouse_analysis
//!
//! mouse_movements ─> MovementSource ─> IncrementalAnalyzer
//! ```

pub mod buffered_writer;
pub mod sqlite_store;
pub mod writer_backend;

pub use buffered_writer::{BufferedWriter, OverflowPolicy, WriterError, WriterSettings};
pub use sqlite_store::SqliteStore;
pub use writer_backend::{BatchStore, MovementSource, PersistedMovement, StoreError, Watermark};

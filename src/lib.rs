//! Pointer capture and kinematics pipeline
//!
//! Raw pointer samples are folded into movement segments (`capture_core`), persisted in
//! batches (`store`), and turned into velocity/acceleration rows by an incremental
//! analyzer (`analysis_core`).

pub mod analysis_core;
pub mod capture_core;
pub mod config;
pub mod sqlite_pragma;
pub mod store;

pub use config::PipelineConfig;

//! Analysis side: turns stored movement segments into kinematics rows
//!
//! ```text
//! mouse_movements ─> IncrementalAnalyzer ─> Kinematics ─> BufferedWriter ─> mouse_analysis
//! ```

pub mod analyzer;
pub mod kinematics;
pub mod record;
pub mod speed_summary;

pub use analyzer::{
    AnalyzerError, AnalyzerSettings, AnalyzerState, IncrementalAnalyzer, PollOutcome,
    MOVEMENT_FETCH_LIMIT,
};
pub use kinematics::{effective_dt, DirectionalRates, Kinematics, DEFAULT_MIN_DT};
pub use record::AnalysisRecord;
pub use speed_summary::{run_speed_monitor, summarize_recent, SpeedSummary};

//! Capture side: raw pointer input to persisted movement segments and actions

pub mod aggregator;
pub mod frames;
pub mod runtime;
pub mod types;

pub use aggregator::SegmentAggregator;
pub use frames::{CaptureError, FrameDecoder, JoystickFrame, LineFramer, Motion};
pub use runtime::{run_capture_writer, run_idle_checker, CaptureHandle};
pub use types::{
    ActionEvent, ActionPhase, CaptureRecord, Displacement, MovementSegment, RawEvent, RawSample,
    Timestamp,
};

//! Capture-side record types
//!
//! Everything here is plain data: raw samples delivered by an input source, the
//! action events it reports, and the movement segments the aggregator emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Timestamp = DateTime<Utc>;

/// Elapsed seconds from `earlier` to `later` (negative if out of order)
pub fn seconds_between(later: Timestamp, earlier: Timestamp) -> f64 {
    match (later - earlier).num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => (later - earlier).num_milliseconds() as f64 / 1_000.0,
    }
}

/// Build a timestamp from fractional seconds since the Unix epoch
pub fn timestamp_from_secs(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

/// A single position tick from the input source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPhase {
    Press,
    Release,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPhase::Press => "press",
            ActionPhase::Release => "release",
        }
    }
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Button or key press/release, with the pointer position at that moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub timestamp: Timestamp,
    pub button: String,
    pub phase: ActionPhase,
    pub x: f64,
    pub y: f64,
}

/// Total displacement magnitude per cardinal direction
///
/// All four fields are non-negative. Screen coordinates: `up` is negative y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    pub right: f64,
    pub left: f64,
    pub up: f64,
    pub down: f64,
}

impl Displacement {
    /// Fold one signed step into the matching accumulators
    pub fn accumulate(&mut self, dx: f64, dy: f64) {
        if dx > 0.0 {
            self.right += dx;
        } else if dx < 0.0 {
            self.left += dx.abs();
        }
        if dy < 0.0 {
            self.up += dy.abs();
        } else if dy > 0.0 {
            self.down += dy;
        }
    }

    /// Right minus left
    pub fn net_dx(&self) -> f64 {
        self.right - self.left
    }

    /// Down minus up
    pub fn net_dy(&self) -> f64 {
        self.down - self.up
    }

    pub fn is_zero(&self) -> bool {
        self.right == 0.0 && self.left == 0.0 && self.up == 0.0 && self.down == 0.0
    }
}

/// A completed run of pointer motion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSegment {
    pub end_timestamp: Timestamp,
    pub displacement: Displacement,
    /// Raw samples folded into this segment
    pub samples: u32,
}

/// Anything the capture side hands to its writer
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureRecord {
    Movement(MovementSegment),
    Action(ActionEvent),
}

impl CaptureRecord {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            CaptureRecord::Movement(segment) => segment.end_timestamp,
            CaptureRecord::Action(action) => action.timestamp,
        }
    }
}

/// Event delivered by a raw input source
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Move(RawSample),
    Action(ActionEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_partitions_by_sign() {
        let mut d = Displacement::default();
        d.accumulate(3.0, -2.0);
        d.accumulate(-1.5, 4.0);
        d.accumulate(0.0, 0.0);

        assert_eq!(d.right, 3.0);
        assert_eq!(d.left, 1.5);
        assert_eq!(d.up, 2.0);
        assert_eq!(d.down, 4.0);
        assert_eq!(d.net_dx(), 1.5);
        assert_eq!(d.net_dy(), 2.0);
    }

    #[test]
    fn test_seconds_between() {
        let a = timestamp_from_secs(1_700_000_000.25).unwrap();
        let b = timestamp_from_secs(1_700_000_002.0).unwrap();
        assert!((seconds_between(b, a) - 1.75).abs() < 1e-9);
        assert!((seconds_between(a, b) + 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_action_phase_serde() {
        let json = serde_json::to_string(&ActionPhase::Press).unwrap();
        assert_eq!(json, "\"press\"");
        assert_eq!(ActionPhase::Release.to_string(), "release");
    }
}

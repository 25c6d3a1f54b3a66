//! Joystick payload decoding
//!
//! Two wire shapes reach the capture side as newline-terminated text:
//!
//! ```text
//! {"dx":3,"dy":-1,"L":0,"U":0,"R":0,"D":0,"X":1}   relative step + buttons (BLE UART)
//! A0=512,A1=498,B1=0,B2=1                          absolute analog axes + buttons (serial)
//! ```
//!
//! `LineFramer` splits byte chunks into lines, `JoystickFrame` parses one line and
//! `FrameDecoder` turns successive frames into `RawEvent`s for the aggregator.

use super::types::{ActionEvent, ActionPhase, RawEvent, RawSample, Timestamp};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Lines longer than this are discarded
pub const MAX_LINE_BYTES: usize = 4096;

const JSON_BUTTONS: [&str; 5] = ["L", "U", "R", "D", "X"];

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    MalformedInput(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

fn malformed(msg: impl Into<String>) -> CaptureError {
    CaptureError::MalformedInput(msg.into())
}

/// Reassembles newline-terminated lines from arbitrary byte chunks
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    /// Set while skipping the remainder of an oversized line
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed (trimmed, non-empty)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else if let Some(line) = self.take_line() {
                    lines.push(line);
                }
                self.buffer.clear();
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() > MAX_LINE_BYTES {
                log::warn!("⚠️  Discarding line longer than {} bytes", MAX_LINE_BYTES);
                self.buffer.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Bytes held for an unfinished line
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn take_line(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buffer);
        let line = text.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Step relative to the previous position
    Relative { dx: f64, dy: f64 },
    /// Absolute axis reading
    Absolute { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoystickFrame {
    pub motion: Motion,
    /// Button name -> held
    pub buttons: BTreeMap<String, bool>,
}

fn number(key: &str, value: &Value) -> Result<f64, CaptureError> {
    let parsed = match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(format!("{} is not a number: {}", key, value))),
    }
}

impl JoystickFrame {
    /// Parse a JSON frame; missing keys count as zero
    pub fn from_json(line: &str) -> Result<Self, CaptureError> {
        let object: Map<String, Value> =
            serde_json::from_str(line).map_err(|e| malformed(format!("invalid JSON frame: {}", e)))?;

        let field = |key: &str| match object.get(key) {
            Some(value) => number(key, value),
            None => Ok(0.0),
        };

        let motion = Motion::Relative {
            dx: field("dx")?,
            dy: field("dy")?,
        };

        let mut buttons = BTreeMap::new();
        for name in JSON_BUTTONS {
            buttons.insert(name.to_string(), field(name)? != 0.0);
        }

        Ok(Self { motion, buttons })
    }

    /// Parse a `KEY=value,...` serial line; `A0` and `A1` are required
    pub fn from_serial_line(line: &str) -> Result<Self, CaptureError> {
        let mut axes: [Option<f64>; 2] = [None, None];
        let mut buttons = BTreeMap::new();

        for item in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, raw) = item
                .split_once('=')
                .ok_or_else(|| malformed(format!("expected KEY=value, got {:?}", item)))?;
            let key = key.trim();
            let value = number(key, &Value::String(raw.to_string()))?;

            match key {
                "A0" => axes[0] = Some(value),
                "A1" => axes[1] = Some(value),
                k if k.starts_with('B') => {
                    buttons.insert(k.to_string(), value != 0.0);
                }
                _ => {}
            }
        }

        match axes {
            [Some(x), Some(y)] => Ok(Self {
                motion: Motion::Absolute { x, y },
                buttons,
            }),
            _ => Err(malformed(format!("missing A0/A1 in {:?}", line))),
        }
    }

    /// Pick the parser by the line's shape
    pub fn parse_line(line: &str) -> Result<Self, CaptureError> {
        let line = line.trim();
        if line.starts_with('{') {
            Self::from_json(line)
        } else if line.contains('=') {
            Self::from_serial_line(line)
        } else {
            Err(malformed(format!("unrecognized frame {:?}", line)))
        }
    }
}

/// Tracks cursor position and held buttons across frames
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    x: f64,
    y: f64,
    started: bool,
    held: BTreeMap<String, bool>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Apply a frame received at `at`
    ///
    /// Emits a move when the position changed (or on the first frame), then one
    /// action per button edge at the new position.
    pub fn decode(&mut self, frame: &JoystickFrame, at: Timestamp) -> Vec<RawEvent> {
        let mut events = Vec::new();

        let (x, y) = match frame.motion {
            Motion::Relative { dx, dy } => (self.x + dx, self.y + dy),
            Motion::Absolute { x, y } => (x, y),
        };
        let moved = x != self.x || y != self.y;
        self.x = x;
        self.y = y;

        if moved || !self.started {
            events.push(RawEvent::Move(RawSample { timestamp: at, x, y }));
        }
        self.started = true;

        for (name, &pressed) in &frame.buttons {
            let was_held = self.held.get(name).copied().unwrap_or(false);
            if pressed != was_held {
                events.push(self.action(name, pressed, at));
            }
        }

        let released: Vec<String> = self
            .held
            .iter()
            .filter(|(name, held)| **held && !frame.buttons.contains_key(*name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &released {
            events.push(self.action(name, false, at));
        }

        self.held = frame.buttons.clone();
        events
    }

    fn action(&self, button: &str, pressed: bool, at: Timestamp) -> RawEvent {
        RawEvent::Action(ActionEvent {
            timestamp: at,
            button: button.to_string(),
            phase: if pressed {
                ActionPhase::Press
            } else {
                ActionPhase::Release
            },
            x: self.x,
            y: self.y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_core::types::timestamp_from_secs;

    fn at(secs: f64) -> Timestamp {
        timestamp_from_secs(1_700_000_000.0 + secs).unwrap()
    }

    #[test]
    fn test_framer_reassembles_split_lines() {
        let mut framer = LineFramer::new();

        assert!(framer.push(b"{\"dx\":1,").is_empty());
        let lines = framer.push(b"\"dy\":2}\n\nA0=1,A1=2\r\n{\"dx\"");

        assert_eq!(lines, vec!["{\"dx\":1,\"dy\":2}", "A0=1,A1=2"]);
        assert_eq!(framer.pending_len(), 5);
    }

    #[test]
    fn test_framer_drops_oversized_line() {
        let mut framer = LineFramer::new();
        let long = vec![b'a'; MAX_LINE_BYTES + 10];

        assert!(framer.push(&long).is_empty());
        let lines = framer.push(b"tail\nA0=1,A1=1\n");

        assert_eq!(lines, vec!["A0=1,A1=1"]);
    }

    #[test]
    fn test_json_frame_defaults_and_numeric_strings() {
        let frame = JoystickFrame::from_json(r#"{"dx":"3","dy":-2,"X":1}"#).unwrap();

        assert_eq!(frame.motion, Motion::Relative { dx: 3.0, dy: -2.0 });
        assert_eq!(frame.buttons.get("X"), Some(&true));
        assert_eq!(frame.buttons.get("L"), Some(&false));
        assert_eq!(frame.buttons.len(), 5);
    }

    #[test]
    fn test_json_frame_rejects_garbage() {
        assert!(JoystickFrame::from_json("{not json").is_err());
        assert!(JoystickFrame::from_json(r#"{"dx":"left"}"#).is_err());
        assert!(JoystickFrame::from_json(r#"{"dx":[1]}"#).is_err());
        assert!(JoystickFrame::from_json("[1,2]").is_err());
    }

    #[test]
    fn test_serial_line() {
        let frame = JoystickFrame::from_serial_line("A0=512,A1=498,B1=0,B2=1").unwrap();

        assert_eq!(frame.motion, Motion::Absolute { x: 512.0, y: 498.0 });
        assert_eq!(frame.buttons.get("B1"), Some(&false));
        assert_eq!(frame.buttons.get("B2"), Some(&true));

        assert!(JoystickFrame::from_serial_line("A0=512,B1=1").is_err());
        assert!(JoystickFrame::from_serial_line("A0=512,A1").is_err());
        assert!(JoystickFrame::from_serial_line("A0=x,A1=1").is_err());
    }

    #[test]
    fn test_parse_line_dispatch() {
        assert!(matches!(
            JoystickFrame::parse_line(" {\"dx\":1} ").unwrap().motion,
            Motion::Relative { .. }
        ));
        assert!(matches!(
            JoystickFrame::parse_line("A0=1,A1=2").unwrap().motion,
            Motion::Absolute { .. }
        ));
        assert!(matches!(
            JoystickFrame::parse_line("hello"),
            Err(CaptureError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_decoder_integrates_relative_steps() {
        let mut decoder = FrameDecoder::new();

        let first = decoder.decode(&JoystickFrame::from_json(r#"{"dx":0,"dy":0}"#).unwrap(), at(0.0));
        assert_eq!(
            first,
            vec![RawEvent::Move(RawSample {
                timestamp: at(0.0),
                x: 0.0,
                y: 0.0
            })]
        );

        decoder.decode(&JoystickFrame::from_json(r#"{"dx":3,"dy":-1}"#).unwrap(), at(0.1));
        decoder.decode(&JoystickFrame::from_json(r#"{"dx":2,"dy":4}"#).unwrap(), at(0.2));
        assert_eq!(decoder.position(), (5.0, 3.0));

        // Resting joystick produces no samples
        let idle = decoder.decode(&JoystickFrame::from_json(r#"{"dx":0,"dy":0}"#).unwrap(), at(0.3));
        assert!(idle.is_empty());
    }

    #[test]
    fn test_decoder_emits_button_edges_once() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&JoystickFrame::from_json(r#"{}"#).unwrap(), at(0.0));

        let pressed = decoder.decode(&JoystickFrame::from_json(r#"{"dx":1,"X":1}"#).unwrap(), at(0.1));
        assert_eq!(pressed.len(), 2);
        assert!(matches!(pressed[0], RawEvent::Move(_)));
        match &pressed[1] {
            RawEvent::Action(action) => {
                assert_eq!(action.button, "X");
                assert_eq!(action.phase, ActionPhase::Press);
                assert_eq!((action.x, action.y), (1.0, 0.0));
            }
            other => panic!("expected action, got {:?}", other),
        }

        let held = decoder.decode(&JoystickFrame::from_json(r#"{"X":1}"#).unwrap(), at(0.2));
        assert!(held.is_empty());

        let released = decoder.decode(&JoystickFrame::from_json(r#"{"X":0}"#).unwrap(), at(0.3));
        assert!(matches!(
            &released[..],
            [RawEvent::Action(ActionEvent { phase: ActionPhase::Release, .. })]
        ));
    }

    #[test]
    fn test_decoder_releases_buttons_missing_from_serial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&JoystickFrame::from_serial_line("A0=10,A1=10,B1=1").unwrap(), at(0.0));

        let events = decoder.decode(&JoystickFrame::from_serial_line("A0=12,A1=10").unwrap(), at(0.1));

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            RawEvent::Action(ActionEvent { phase: ActionPhase::Release, button, .. }) if button == "B1"
        ));
    }
}

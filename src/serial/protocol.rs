//! Sensor line protocol.
//!
//! The sensor firmware emits newline-terminated lines in one of two forms:
//!
//! * structured: a JSON object carrying a `motion` boolean, e.g. `{"motion": true}`
//! * textual: free text containing `Motion detected!` or `Motion stopped`
//!
//! Anything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MOTION_DETECTED_MARKER: &str = "Motion detected!";
pub const MOTION_STOPPED_MARKER: &str = "Motion stopped";

/// Upper bound on buffered bytes without a line terminator before the
/// buffer is trimmed.
pub const MAX_PARTIAL_LINE: usize = 8192;

/// A change of the sensor's motion reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEdge {
    pub motion: bool,
    pub at: DateTime<Utc>,
}

impl MotionEdge {
    pub fn new(motion: bool) -> Self {
        Self {
            motion,
            at: Utc::now(),
        }
    }
}

/// Parse one sensor line into a motion reading.
///
/// Returns `None` for empty lines, JSON without a boolean `motion` field and
/// text without either marker.
pub fn parse_motion_line(line: &str) -> Option<bool> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value) => value.get("motion").and_then(Value::as_bool),
        Err(_) => {
            if line.contains(MOTION_DETECTED_MARKER) {
                Some(true)
            } else if line.contains(MOTION_STOPPED_MARKER) {
                Some(false)
            } else {
                None
            }
        }
    }
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
    trims: u64,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete, non-blank line it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find(['\n', '\r']) {
            let line = self.partial[..pos].trim().to_string();
            self.partial.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.partial.len() > MAX_PARTIAL_LINE {
            let keep_from = self.partial.len() - MAX_PARTIAL_LINE / 2;
            let keep_from = (keep_from..self.partial.len())
                .find(|i| self.partial.is_char_boundary(*i))
                .unwrap_or(self.partial.len());
            self.partial.drain(..keep_from);
            self.trims += 1;
            log::warn!("Discarded unterminated serial data ({} trims so far)", self.trims);
        }

        lines
    }

    /// Drop any partial line, used when the link is replaced.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    pub fn trims(&self) -> u64 {
        self.trims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_motion() {
        assert_eq!(parse_motion_line(r#"{"motion": true}"#), Some(true));
        assert_eq!(parse_motion_line(r#"{"motion":false,"distance":12}"#), Some(false));
    }

    #[test]
    fn test_structured_without_motion_is_ignored() {
        assert_eq!(parse_motion_line(r#"{"speed": 14}"#), None);
        assert_eq!(parse_motion_line(r#"{"motion": "yes"}"#), None);
        assert_eq!(parse_motion_line("42"), None);
    }

    #[test]
    fn test_text_markers() {
        assert_eq!(parse_motion_line("PIR: Motion detected!"), Some(true));
        assert_eq!(parse_motion_line("Motion stopped"), Some(false));
        assert_eq!(parse_motion_line("booting..."), None);
        assert_eq!(parse_motion_line("   "), None);
    }

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"mot").is_empty());
        let lines = buffer.push(b"ion\": true}\r\n\r\nMotion stopped\nrest");
        assert_eq!(lines, vec![r#"{"motion": true}"#.to_string(), "Motion stopped".to_string()]);
        assert_eq!(buffer.push(b"\n"), vec!["rest".to_string()]);
    }

    #[test]
    fn test_line_buffer_trims_runaway_data() {
        let mut buffer = LineBuffer::new();
        let junk = vec![b'x'; MAX_PARTIAL_LINE + 10];
        assert!(buffer.push(&junk).is_empty());
        assert_eq!(buffer.trims(), 1);
        let lines = buffer.push(b"\nMotion detected!\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(parse_motion_line(&lines[1]), Some(true));
    }
}

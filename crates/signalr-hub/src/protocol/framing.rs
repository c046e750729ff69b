//! Record-separator framing for the JSON hub protocol.

use crate::error::Result;
use serde::Serialize;

/// Terminates every message on the wire, in both directions.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Splits a raw payload into its terminated frames, in arrival order.
///
/// Bytes after the last separator form an incomplete frame and are dropped.
/// Frames are never reassembled across payloads.
pub fn frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .rfind(RECORD_SEPARATOR)
        .into_iter()
        .flat_map(move |end| payload[..end].split(RECORD_SEPARATOR))
}

/// Serializes a message to JSON and appends the record separator.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn write_message<T: Serialize>(message: &T) -> Result<String> {
    let mut frame = serde_json::to_string(message)?;
    frame.push(RECORD_SEPARATOR);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frames_in_order() {
        let frames: Vec<_> = frames("{\"a\":1}\u{1e}{\"b\":2}\u{1e}").collect();
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_trailing_partial_frame_dropped() {
        let frames: Vec<_> = frames("{}\u{1e}{\"partial\"").collect();
        assert_eq!(frames, vec!["{}"]);
    }

    #[test]
    fn test_no_separator_yields_nothing() {
        assert_eq!(frames("{}").count(), 0);
        assert_eq!(frames("").count(), 0);
    }

    #[test]
    fn test_empty_frames_preserved() {
        let frames: Vec<_> = frames("\u{1e}\u{1e}").collect();
        assert_eq!(frames, vec!["", ""]);
    }

    #[test]
    fn test_write_message_terminates() {
        let frame = write_message(&json!({"type": 6})).unwrap();
        assert_eq!(frame, "{\"type\":6}\u{1e}");
    }
}

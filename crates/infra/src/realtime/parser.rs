//! Incremental parser for the server-sent-events wire format.
//!
//! Bytes arrive in arbitrary chunks; the parser keeps a rolling buffer and
//! only consumes complete lines, so a line split across two chunks is
//! finished by the next push rather than dropped. A record is dispatched on
//! the blank-line terminator when both an event name and a non-empty
//! payload have accumulated.

use tracing::{debug, trace};

/// One complete event record from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name from the `event:` field.
    pub name: String,
    /// Payload: `data:` lines joined with newlines.
    pub data: String,
}

/// Rolling event-stream parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stream text, returning every record completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let rest = self.buffer.split_off(newline + 1);
            let raw = std::mem::replace(&mut self.buffer, rest);
            let line = raw.trim_end_matches(['\n', '\r']);
            self.process_line(line, &mut frames);
        }

        frames
    }

    fn process_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            // Record terminator: dispatch only when both parts accumulated.
            if let Some(name) = self.event_name.take() {
                let data = self.data_lines.join("\n");
                if !data.is_empty() {
                    frames.push(SseFrame { name, data });
                }
            }
            self.data_lines.clear();
            return;
        }

        if let Some(comment) = line.strip_prefix(':') {
            trace!(comment, "keep-alive comment");
            return;
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event_name = Some(trim_field(value).to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(trim_field(value).to_string());
        } else {
            debug!(line, "ignoring unknown event-stream field");
        }
    }
}

// One optional leading space after the colon is part of the field syntax.
fn trim_field(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_event() {
        let mut parser = SseParser::new();
        let frames = parser.push("event: tag_scanned\ndata: {\"petName\":\"Max\"}\n\n");

        assert_eq!(
            frames,
            [SseFrame {
                name: "tag_scanned".to_string(),
                data: "{\"petName\":\"Max\"}".to_string()
            }]
        );
    }

    #[test]
    fn split_across_chunks_yields_exactly_one_event() {
        let full = "event: tag_scanned\ndata: {\"petName\":\"Max\"}\n\n";

        // Split mid-line at every possible byte boundary.
        for split in 1..full.len() {
            let mut parser = SseParser::new();
            let mut frames = parser.push(&full[..split]);
            frames.extend(parser.push(&full[split..]));

            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].name, "tag_scanned");
            assert_eq!(frames[0].data, "{\"petName\":\"Max\"}");
        }
    }

    #[test]
    fn multiple_data_lines_are_newline_joined() {
        let mut parser = SseParser::new();
        let frames = parser.push("event: connected\ndata: line one\ndata: line two\n\n");

        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn comment_lines_are_ignored() {
        let mut parser = SseParser::new();
        let frames = parser.push(": keep-alive\n\nevent: pet_found\ndata: {}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "pet_found");
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut parser = SseParser::new();
        let frames = parser.push("event: pet_found\n\n");

        assert!(frames.is_empty());
    }

    #[test]
    fn data_without_event_name_dispatches_nothing() {
        let mut parser = SseParser::new();
        let frames = parser.push("data: {\"orphan\":true}\n\n");

        assert!(frames.is_empty());
    }

    #[test]
    fn record_state_resets_between_events() {
        let mut parser = SseParser::new();
        let first = parser.push("event: pet_found\ndata: {\"a\":1}\n\n");
        let second = parser.push("event: alert_created\ndata: {\"b\":2}\n\n");

        assert_eq!(first[0].name, "pet_found");
        assert_eq!(second[0].name, "alert_created");
        assert_eq!(second[0].data, "{\"b\":2}");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = SseParser::new();
        let frames = parser.push("event: pet_found\r\ndata: {}\r\n\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn trailing_partial_line_is_preserved() {
        let mut parser = SseParser::new();
        assert!(parser.push("event: pet_fou").is_empty());

        let frames = parser.push("nd\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "pet_found");
    }

    #[test]
    fn field_without_space_after_colon_is_accepted() {
        let mut parser = SseParser::new();
        let frames = parser.push("event:pet_found\ndata:{}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "pet_found");
        assert_eq!(frames[0].data, "{}");
    }
}

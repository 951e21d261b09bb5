//! Field-level parsing of complete SSE frames.
//!
//! Implements the field semantics of the `text/event-stream` format:
//! `data`, `event`, `id` and `retry` are recognised, lines starting with `:`
//! are comments, unknown fields are ignored.

use crate::decoder::Frame;
use crate::types::{Message, DEFAULT_EVENT_TYPE};

/// Result of parsing one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedFrame {
    /// The dispatched message, if the frame carried at least one `data` field.
    pub message: Option<Message>,
    /// Number of comment lines in the frame.
    pub comments: usize,
}

/// Accumulator for the frame currently being parsed. Never escapes
/// [`EventParser::parse_frame`].
#[derive(Debug, Default)]
struct PendingEvent {
    data: Option<String>,
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl PendingEvent {
    fn dispatch(self) -> Option<Message> {
        let mut data = self.data?;
        if data.ends_with('\n') {
            data.pop();
        }
        Some(Message {
            data,
            event: self
                .event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            id: self.id,
            retry_hint: self.retry,
        })
    }
}

/// Stateful frame parser.
///
/// The only state carried between frames is the last event id, which the
/// client sends back as `Last-Event-ID` when it reconnects.
#[derive(Debug, Default, Clone)]
pub struct EventParser {
    last_event_id: Option<String>,
}

impl EventParser {
    /// Create a parser with no last event id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser resuming from a known event id.
    pub fn with_last_event_id(last_event_id: Option<String>) -> Self {
        Self { last_event_id }
    }

    /// The most recent event id seen (or seeded).
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Parse one complete frame.
    pub fn parse_frame(&mut self, frame: &Frame) -> ParsedFrame {
        let mut pending = PendingEvent::default();
        let mut comments = 0;

        for line in frame.lines() {
            if line.starts_with(':') {
                comments += 1;
                continue;
            }

            let (field, value) = split_field(line);
            match field {
                "data" => {
                    let data = pending.data.get_or_insert_with(String::new);
                    data.push_str(value);
                    data.push('\n');
                }
                "event" => pending.event = Some(value.to_string()),
                "id" => {
                    if value.contains('\0') {
                        continue;
                    }
                    pending.id = Some(value.to_string());
                    self.last_event_id = if value.is_empty() {
                        None
                    } else {
                        Some(value.to_string())
                    };
                }
                "retry" => {
                    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                        if let Ok(ms) = value.parse() {
                            pending.retry = Some(ms);
                        }
                    }
                }
                _ => {}
            }
        }

        ParsedFrame {
            message: pending.dispatch(),
            comments,
        }
    }
}

/// Split a line on its first `:`, stripping one leading space from the value.
///
/// A line with no colon is a field name with an empty value.
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

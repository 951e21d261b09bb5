//! Wire encoding for the `text/event-stream` format.
//!
//! The inverse of [`FrameDecoder`](crate::decoder::FrameDecoder) plus
//! [`EventParser`](crate::parser::EventParser): useful for serving SSE to
//! this client and for building test fixtures.

use crate::types::{Message, DEFAULT_EVENT_TYPE};

/// Reconnection hint servers commonly send with their first event.
pub const DEFAULT_RETRY_HINT_MS: u64 = 3000;

/// Event type servers conventionally use to mark the end of a stream.
///
/// Pair with [`ClientConfig::with_terminal_event`](crate::ClientConfig::with_terminal_event).
pub const DONE_EVENT: &str = "done";

/// Standard response headers for an event stream.
pub const SSE_RESPONSE_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Format a message as one SSE frame.
///
/// Fields are written in the order `retry`, `id`, `event`, `data`. The
/// `event` field is omitted for the default `message` type, and multi-line
/// data becomes one `data:` line per payload line.
///
/// ```
/// use resilient_sse::encode::format_event;
/// use resilient_sse::Message;
///
/// let frame = format_event(&Message::new("a\nb").with_event("update").with_id("7"));
/// assert_eq!(frame, "id: 7\nevent: update\ndata: a\ndata: b\n\n");
/// ```
pub fn format_event(message: &Message) -> String {
    let mut out = String::with_capacity(message.data.len() + 32);

    if let Some(retry) = message.retry_hint {
        out.push_str(&format!("retry: {retry}\n"));
    }
    if let Some(id) = &message.id {
        push_field(&mut out, "id", &single_line(id));
    }
    if !message.event.is_empty() && message.event != DEFAULT_EVENT_TYPE {
        push_field(&mut out, "event", &single_line(&message.event));
    }
    for line in payload_lines(&message.data) {
        push_field(&mut out, "data", line);
    }

    out.push('\n');
    out
}

/// Format a comment frame, e.g. a keep-alive heartbeat.
///
/// ```
/// assert_eq!(resilient_sse::encode::comment("ping"), ": ping\n\n");
/// ```
pub fn comment(text: &str) -> String {
    let mut out = String::new();
    for line in payload_lines(text) {
        if line.is_empty() {
            out.push_str(":\n");
        } else {
            out.push_str(": ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// Split a payload on any line terminator. Always yields at least one line.
fn payload_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(['\r', '\n']) {
            Some(pos) => {
                let skip = if current[pos..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[pos + skip..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

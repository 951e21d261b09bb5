//! Core value types shared by every layer of the client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event type assigned to messages whose frame carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One dispatched SSE message.
///
/// `data` is the `\n`-join of every `data:` line of the frame. The payload is
/// opaque to the client; interpreting it is the consumer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Joined data payload.
    pub data: String,
    /// Event type, `"message"` unless the frame set one.
    pub event: String,
    /// The `id:` field of the frame, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Server-advertised reconnection delay in milliseconds.
    ///
    /// Informational only; the client's own backoff schedule is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<u64>,
}

impl Message {
    /// Create a message with the default event type.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: DEFAULT_EVENT_TYPE.to_string(),
            id: None,
            retry_hint: None,
        }
    }

    /// Set the event type (builder-style).
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    /// Set the event id (builder-style).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the retry hint in milliseconds (builder-style).
    pub fn with_retry_hint(mut self, retry_ms: u64) -> Self {
        self.retry_hint = Some(retry_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Connection lifecycle state of an [`SseClient`](crate::client::SseClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening the transport.
    Connecting,
    /// Transport open, frames flowing.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Terminal for the current lifecycle: closed, ended, or out of attempts.
    Disconnected,
}

impl ConnectionState {
    /// Returns `true` while frames are being received.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` once the lifecycle has ended.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

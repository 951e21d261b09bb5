//! SSE client error types.
//!
//! Every failure the client can observe maps to one [`SseError`] variant:
//! - transport failures (non-success status, network errors)
//! - protocol failures (empty body, invalid UTF-8 in the stream)
//! - heartbeat timeouts raised by the liveness monitor
//! - user-initiated cancellation, which is never reported through
//!   [`SseHandler::on_error`](crate::client::SseHandler::on_error)

use std::time::Duration;

// ---------------------------------------------------------------------------
// SseError enum
// ---------------------------------------------------------------------------

/// Unified error type for the SSE client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SseError {
    /// Transport-level error: non-success HTTP status or a network failure.
    ///
    /// `status` is `None` when no response was received at all.
    #[error("Transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status code, when the server answered.
        status: Option<u16>,
        /// Human-readable error message.
        message: String,
    },

    /// The byte stream could not be decoded into frames.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No line (data or comment) arrived within the heartbeat timeout.
    #[error("Heartbeat timeout: no activity for {}ms (timeout {}ms)", elapsed.as_millis(), timeout.as_millis())]
    HeartbeatTimeout {
        /// Time since the last received line.
        elapsed: Duration,
        /// Configured heartbeat timeout.
        timeout: Duration,
    },

    /// The connection was cancelled by the consumer.
    #[error("Connection cancelled")]
    Cancelled,

    /// Reconnection gave up after `attempts` consecutive failures.
    #[error("Max reconnect attempts reached ({attempts}): {last}")]
    MaxAttemptsReached {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The failure that exhausted the budget.
        last: Box<SseError>,
    },

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The client was closed and cannot be reconnected.
    #[error("Client is closed")]
    Closed,
}

/// Convenience result type for SSE client operations.
pub type SseResult<T> = Result<T, SseError>;

impl SseError {
    /// Create a `Transport` error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Create a `Transport` error for a non-success HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a `Protocol` error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a `Config` error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the reconnection controller may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SseError::Transport { .. } | SseError::Protocol(_) | SseError::HeartbeatTimeout { .. }
        )
    }

    /// Returns `true` for user-initiated cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SseError::Cancelled | SseError::Closed)
    }

    /// HTTP status code carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SseError::Transport { status, .. } => *status,
            SseError::MaxAttemptsReached { last, .. } => last.http_status(),
            _ => None,
        }
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for SseError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("HTTP request failed: {err}")
        };
        SseError::Transport { status, message }
    }
}

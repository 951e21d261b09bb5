//! # resilient-sse — Server-Sent Events client that stays connected
//!
//! A streaming client for `text/event-stream` endpoints that survives the
//! ways long-lived HTTP streams actually fail in production:
//!
//! - network chunks that split frames, lines, or UTF-8 sequences anywhere
//! - proxies that keep a dead TCP connection open without sending bytes
//! - transient errors that deserve a bounded, jittered retry
//! - user cancellation, which must never look like a failure
//!
//! ## Overview
//!
//! This crate provides:
//! - **Frame decoding** that is invariant under arbitrary chunking
//!   ([`decoder::FrameDecoder`], [`parser::EventParser`])
//! - **Liveness detection** via heartbeat timeouts ([`liveness::LivenessMonitor`])
//! - **Reconnection** with exponential backoff and jitter
//!   ([`controller::ReconnectState`], [`backoff::BackoffPolicy`])
//! - **Two transports**: manual streaming with any method, headers and body
//!   (needed for bearer auth, and the default), and an opt-in managed
//!   GET-only event source
//! - **A callback interface** ([`client::SseHandler`]) with a channel
//!   adapter for pull-based consumption ([`client::SseStream`])
//!
//! ## Feature flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `client` | yes     | reqwest-backed transports (`HttpTransport`, `EventSourceTransport`) |
//! | `full`   | no      | Enable all features |
//!
//! Without `client`, bring your own [`client::Transport`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use resilient_sse::client::{ChannelHandler, ClientEvent, SseClient};
//! use resilient_sse::{ClientConfig, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://api.example.com/events")
//!         .with_bearer_token("secret")
//!         .with_heartbeat_timeout(Duration::from_secs(15))
//!         .with_max_reconnect_attempts(5);
//!
//!     let (handler, mut events) = ChannelHandler::new();
//!     let client = SseClient::from_config(config, handler)?;
//!     client.connect()?;
//!
//!     while let Some(event) = events.next().await {
//!         match event {
//!             ClientEvent::Message(msg) => println!("[{}] {}", msg.event, msg.data),
//!             ClientEvent::Status(ConnectionState::Disconnected) => break,
//!             ClientEvent::Error(e) => eprintln!("error: {e}"),
//!             _ => {}
//!         }
//!     }
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`client::SseClient`] — owns the lifecycle; `connect()`, `close()`
//! - [`client::Transport`] — opens one connection attempt
//! - [`decoder::FrameDecoder`] — bytes to frames, chunk-boundary safe
//! - [`parser::EventParser`] — frames to [`Message`]s
//! - [`liveness::LivenessMonitor`] — heartbeat timeout detection
//! - [`controller::ReconnectState`] — pure reconnection state machine
//! - [`encode`] — the inverse formatter, for servers and fixtures
//! - [`error::SseError`] — error taxonomy with retry classification

pub mod backoff;
pub mod client;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod liveness;
pub mod parser;
pub mod types;

/// Prelude module that re-exports commonly used types and traits.
///
/// ```
/// use resilient_sse::prelude::*;
///
/// let config = ClientConfig::new("http://localhost:8080/events");
/// assert_eq!(config.max_reconnect_attempts, 5);
/// ```
pub mod prelude {
    pub use crate::client::{ChannelHandler, ClientEvent, SseClient, SseHandler, SseStream, Transport};
    pub use crate::config::ClientConfig;
    pub use crate::error::{SseError, SseResult};
    pub use crate::types::{ConnectionState, Message};

    #[cfg(feature = "client")]
    pub use crate::client::{EventSourceTransport, HttpTransport};
}

// Re-export core types at crate root for convenience.
pub use config::ClientConfig;
pub use error::{SseError, SseResult};
pub use types::*;

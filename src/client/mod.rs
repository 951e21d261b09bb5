//! SSE client: connect to an event stream and stay connected.
//!
//! - [`SseClient`] — lifecycle owner: `connect()`, `close()`, state
//! - [`SseHandler`] — callback interface for messages, errors, status,
//!   heartbeats
//! - [`ChannelHandler`] / [`SseStream`] — pull-based adapter over the
//!   callbacks
//! - [`Transport`] — pluggable stream opener, with [`HttpTransport`]
//!   (manual, any method/headers/body) and [`EventSourceTransport`]
//!   (managed, GET only, opt-in)
//!
//! # Quick Start
//!
//! ```no_run
//! use resilient_sse::client::{ChannelHandler, ClientEvent, SseClient};
//! use resilient_sse::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Authenticated POST stream (uses the manual transport):
//! let config = ClientConfig::new("https://api.example.com/chat/stream")
//!     .with_method("POST")
//!     .with_bearer_token("secret")
//!     .with_header("Content-Type", "application/json")
//!     .with_body(r#"{"message":"hello"}"#)
//!     .with_terminal_event("done");
//!
//! let (handler, mut events) = ChannelHandler::new();
//! let client = SseClient::from_config(config, handler)?;
//! client.connect()?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         ClientEvent::Message(msg) => println!("{}: {}", msg.event, msg.data),
//!         ClientEvent::Status(state) => println!("-- {state}"),
//!         ClientEvent::Error(e) => eprintln!("error: {e}"),
//!         ClientEvent::Heartbeat => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod sse;
mod sse_client;
mod transport;

pub use sse::{ChannelHandler, ClientEvent, SseHandler, SseStream};
pub use sse_client::SseClient;
pub use transport::{
    cancellable, StreamRequest, Transport, TransportCapabilities, TransportChunk,
    TransportStream, LAST_EVENT_ID_HEADER,
};

#[cfg(feature = "client")]
pub use transport::{select_transport, EventSourceTransport, HttpTransport};

//! Consumer-facing callback interface.
//!
//! [`SseHandler`] is the push-based surface: the client calls it from its
//! driver task for every message, error, state change, and heartbeat.
//! [`ChannelHandler`] adapts it to a pull-based [`SseStream`] that supports
//! both `next()` and the `futures::Stream` trait.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::error::SseError;
use crate::types::{ConnectionState, Message};

/// Callbacks invoked by an [`SseClient`](super::SseClient).
///
/// All callbacks run on the client's driver task and must not block. Only
/// [`on_message`](Self::on_message) is required.
pub trait SseHandler: Send + Sync + 'static {
    /// A frame with at least one `data` field was dispatched.
    fn on_message(&self, message: Message);

    /// A transport, protocol, or heartbeat failure occurred, or reconnection
    /// gave up. Never called for user-initiated cancellation.
    fn on_error(&self, _error: &SseError) {}

    /// The connection state changed.
    fn on_connection_status(&self, _state: ConnectionState) {}

    /// A comment line (heartbeat) was received.
    fn on_heartbeat(&self) {}
}

impl<H: SseHandler + ?Sized> SseHandler for Arc<H> {
    fn on_message(&self, message: Message) {
        (**self).on_message(message);
    }

    fn on_error(&self, error: &SseError) {
        (**self).on_error(error);
    }

    fn on_connection_status(&self, state: ConnectionState) {
        (**self).on_connection_status(state);
    }

    fn on_heartbeat(&self) {
        (**self).on_heartbeat();
    }
}

/// Everything a client reports, as a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A dispatched message.
    Message(Message),
    /// A reported error.
    Error(SseError),
    /// A connection state transition.
    Status(ConnectionState),
    /// A comment line was received.
    Heartbeat,
}

/// [`SseHandler`] that forwards every callback into a channel.
///
/// Created together with its receiving [`SseStream`] by
/// [`ChannelHandler::new()`].
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelHandler {
    /// Create a handler and the stream that receives its events.
    pub fn new() -> (Self, SseStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, SseStream { receiver: rx })
    }

    fn forward(&self, event: ClientEvent) {
        // The consumer may have dropped the stream; nothing left to notify.
        let _ = self.tx.send(event);
    }
}

impl SseHandler for ChannelHandler {
    fn on_message(&self, message: Message) {
        self.forward(ClientEvent::Message(message));
    }

    fn on_error(&self, error: &SseError) {
        self.forward(ClientEvent::Error(error.clone()));
    }

    fn on_connection_status(&self, state: ConnectionState) {
        self.forward(ClientEvent::Status(state));
    }

    fn on_heartbeat(&self) {
        self.forward(ClientEvent::Heartbeat);
    }
}

/// A stream of [`ClientEvent`]s fed by a [`ChannelHandler`].
///
/// # Example
///
/// ```no_run
/// # async fn example(mut stream: resilient_sse::client::SseStream) {
/// use resilient_sse::client::ClientEvent;
///
/// while let Some(event) = stream.next().await {
///     match event {
///         ClientEvent::Message(msg) => println!("{}: {}", msg.event, msg.data),
///         ClientEvent::Error(e) => eprintln!("stream error: {e}"),
///         _ => {}
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct SseStream {
    receiver: mpsc::UnboundedReceiver<ClientEvent>,
}

impl SseStream {
    /// Get the next event.
    ///
    /// Returns `None` once every [`ChannelHandler`] clone has been dropped.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.receiver.recv().await
    }

    /// Get the next message, skipping status, error and heartbeat events.
    pub async fn next_message(&mut self) -> Option<Message> {
        while let Some(event) = self.receiver.recv().await {
            if let ClientEvent::Message(message) = event {
                return Some(message);
            }
        }
        None
    }

    /// Take an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<ClientEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for SseStream {
    type Item = ClientEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

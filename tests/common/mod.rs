//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use resilient_sse::client::{
    ClientEvent, SseStream, StreamRequest, Transport, TransportCapabilities, TransportChunk,
    TransportStream,
};
use resilient_sse::{ConnectionState, Message, SseError, SseResult};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// One step of a scripted stream body.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver raw bytes.
    Chunk(Vec<u8>),
    /// Deliver an already-parsed message (managed transport behaviour).
    Message(Message),
    /// Fail the stream.
    Error(SseError),
    /// Wait before the next step.
    Sleep(Duration),
    /// Stop delivering anything, forever.
    Hang,
}

impl Step {
    pub fn text(s: &str) -> Self {
        Step::Chunk(s.as_bytes().to_vec())
    }
}

/// What the transport does for one connection attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    /// `open` fails with this error.
    Fail(SseError),
    /// `open` succeeds and the body plays these steps, then ends.
    Stream(Vec<Step>),
}

/// A [`Transport`] that replays one scripted [`Attempt`] per `open` call and
/// records every request it receives.
///
/// Once the script runs out, `open` fails with a transport error.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    attempts: Arc<Mutex<VecDeque<Attempt>>>,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl ScriptedTransport {
    pub fn new(attempts: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(attempts.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    /// Every request passed to `open`, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            custom_headers: true,
            request_body: true,
            any_method: true,
        }
    }

    async fn open(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> SseResult<TransportStream> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.attempts.lock().unwrap().pop_front();

        match next {
            None => Err(SseError::transport("script exhausted")),
            Some(Attempt::Fail(err)) => Err(err),
            Some(Attempt::Stream(steps)) => {
                let body = async_stream::stream! {
                    for step in steps {
                        match step {
                            Step::Chunk(bytes) => yield Ok(TransportChunk::Bytes(Bytes::from(bytes))),
                            Step::Message(message) => yield Ok(TransportChunk::Message(message)),
                            Step::Error(err) => {
                                yield Err(err);
                                break;
                            }
                            Step::Sleep(delay) => tokio::time::sleep(delay).await,
                            Step::Hang => futures::future::pending::<()>().await,
                        }
                    }
                };
                Ok(body.take_until(cancel.cancelled_owned()).boxed())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Wait for the next event, failing the test after a generous timeout.
pub async fn next_event(stream: &mut SseStream) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(120), stream.next())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// Collect events up to and including the first one matching `done`.
pub async fn collect_until(
    stream: &mut SseStream,
    done: impl Fn(&ClientEvent) -> bool,
) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(stream).await;
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

/// Collect events until the client reports `state`.
pub async fn collect_until_state(
    stream: &mut SseStream,
    state: ConnectionState,
) -> Vec<ClientEvent> {
    collect_until(stream, |e| *e == ClientEvent::Status(state)).await
}

/// Take every event already queued, without waiting.
pub fn drain(stream: &mut SseStream) -> Vec<ClientEvent> {
    std::iter::from_fn(|| stream.try_next()).collect()
}

pub fn statuses(events: &[ClientEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Status(s) => Some(*s),
            _ => None,
        })
        .collect()
}

pub fn messages(events: &[ClientEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Message(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[ClientEvent]) -> Vec<SseError> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Error(err) => Some(err.clone()),
            _ => None,
        })
        .collect()
}

pub fn count_state(events: &[ClientEvent], state: ConnectionState) -> usize {
    statuses(events).into_iter().filter(|s| *s == state).count()
}

// ---------------------------------------------------------------------------
// HTTP test server
// ---------------------------------------------------------------------------

/// Start an axum app on a random local port.
pub async fn start_test_server(app: axum::Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Brief wait for the server to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (base_url, handle)
}

/// Initialise test logging once. Honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

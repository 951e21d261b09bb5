//! Transport layer: opening the underlying event stream.
//!
//! Provides the [`Transport`] trait plus two strategies behind the `client`
//! feature:
//!
//! - [`HttpTransport`] — manual request with any method, headers, and body.
//!   The raw body bytes are handed to the client's frame decoder. Required
//!   for authenticated APIs, since it can send `Authorization` headers.
//! - [`EventSourceTransport`] — managed GET-only strategy built on
//!   `reqwest-eventsource`, which parses frames itself. The client then only
//!   adapts the already-parsed messages. Opt-in; it cannot see comments.
//!
//! [`select_transport`] always returns the manual strategy.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{SseError, SseResult};
use crate::types::Message;

/// Request header carrying the resume point on reconnection.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

// ---------------------------------------------------------------------------
// Request / stream types
// ---------------------------------------------------------------------------

/// Everything a transport needs to open one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Endpoint URL.
    pub url: String,
    /// HTTP method, upper case.
    pub method: String,
    /// Custom request headers.
    pub headers: HashMap<String, String>,
    /// Optional request body.
    pub body: Option<String>,
    /// Resume point, sent as `Last-Event-ID`.
    pub last_event_id: Option<String>,
    /// Optional timeout on opening the stream.
    pub connect_timeout: Option<Duration>,
}

impl StreamRequest {
    /// Build the request for one attempt from the client configuration.
    pub fn from_config(config: &ClientConfig, last_event_id: Option<String>) -> Self {
        Self {
            url: config.url.clone(),
            method: config.method.to_ascii_uppercase(),
            headers: config.headers.clone(),
            body: config.body.clone(),
            last_event_id,
            connect_timeout: config.connect_timeout,
        }
    }

    /// Returns `true` for a plain GET request.
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// One item read from an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportChunk {
    /// Raw body bytes, to be decoded by the client.
    Bytes(Bytes),
    /// A message already parsed by a managed transport.
    Message(Message),
}

/// An open transport stream.
///
/// Ends with `None` when the server closes the body cleanly.
pub type TransportStream = BoxStream<'static, SseResult<TransportChunk>>;

/// What a transport can express in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Arbitrary request headers (e.g. bearer auth).
    pub custom_headers: bool,
    /// A request body.
    pub request_body: bool,
    /// Methods other than GET.
    pub any_method: bool,
}

impl TransportCapabilities {
    /// Returns `true` if `request` can be sent with these capabilities.
    pub fn supports(&self, request: &StreamRequest) -> bool {
        (self.custom_headers || request.headers.is_empty())
            && (self.request_body || request.body.is_none())
            && (self.any_method || request.is_get())
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Opens event streams for the client.
///
/// Implementations must resolve promptly with [`SseError::Cancelled`] once
/// `cancel` fires, both while opening and while the stream is being read.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Request features this transport supports.
    fn capabilities(&self) -> TransportCapabilities;

    /// Open one connection attempt.
    ///
    /// # Errors
    ///
    /// - [`SseError::Transport`] on network failure or non-success status
    /// - [`SseError::Protocol`] if the response has no body
    /// - [`SseError::Cancelled`] if `cancel` fired first
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> SseResult<TransportStream>;
}

/// Await `fut`, giving up on cancellation or after `timeout`.
pub async fn cancellable<F, T>(
    fut: F,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> SseResult<T>
where
    F: Future<Output = SseResult<T>>,
{
    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                SseError::transport(format!(
                    "stream open timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SseError::Cancelled),
        result = bounded => result,
    }
}

// ---------------------------------------------------------------------------
// reqwest-backed strategies
// ---------------------------------------------------------------------------

#[cfg(feature = "client")]
pub use http::{select_transport, EventSourceTransport, HttpTransport};

#[cfg(feature = "client")]
mod http {
    use std::sync::Arc;

    use futures::{future, StreamExt};
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_LENGTH};
    use reqwest_eventsource::{Event as EsEvent, EventSource};
    use tracing::{debug, warn};

    use super::*;

    /// Bytes of a non-success response body kept for the error message.
    const MAX_ERROR_BODY: usize = 4096;

    /// How long to wait for a non-success body when no connect timeout is set.
    const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Header value for a resume id, or `None` (logged) if the id cannot be
    /// sent as a header.
    fn last_event_id_value(id: &str) -> Option<HeaderValue> {
        match HeaderValue::from_bytes(id.as_bytes()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(last_event_id = ?id, error = %e, "Dropping Last-Event-ID that is not a valid header value");
                None
            }
        }
    }

    /// Read at most [`MAX_ERROR_BODY`] bytes of a failed response.
    async fn error_body(response: reqwest::Response) -> String {
        let mut body = Vec::new();
        let mut chunks = std::pin::pin!(response.bytes_stream());
        while let Some(Ok(chunk)) = chunks.next().await {
            let room = MAX_ERROR_BODY - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_ERROR_BODY {
                break;
            }
        }
        String::from_utf8_lossy(&body).into_owned()
    }

    /// `eventsource-stream` reports the sticky last event id on every event.
    /// Recover the frame's own `id:` field by reporting it only when it
    /// changes.
    fn own_id(previous: &mut String, current: String) -> Option<String> {
        if *previous == current {
            return None;
        }
        *previous = current.clone();
        Some(current)
    }

    fn build_headers(request: &StreamRequest) -> SseResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SseError::config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SseError::config(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        if let Some(value) = request.last_event_id.as_deref().and_then(last_event_id_value) {
            headers.insert(HeaderName::from_static("last-event-id"), value);
        }
        Ok(headers)
    }

    fn default_client() -> reqwest::Client {
        reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    /// Manual streaming strategy: any method, headers and body.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use resilient_sse::client::{ChannelHandler, HttpTransport, SseClient};
    /// use resilient_sse::ClientConfig;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::new("https://api.example.com/chat")
    ///     .with_method("POST")
    ///     .with_bearer_token("secret")
    ///     .with_body(r#"{"message":"hi"}"#);
    /// let (handler, mut stream) = ChannelHandler::new();
    /// let client = SseClient::new(config, Arc::new(HttpTransport::new()), handler)?;
    /// client.connect()?;
    /// # Ok(())
    /// # }
    /// ```
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HttpTransport {
        /// Create a transport with a default `reqwest::Client`.
        pub fn new() -> Self {
            Self::with_client(default_client())
        }

        /// Create a transport with an existing `reqwest::Client`.
        ///
        /// Useful to share a connection pool or configure TLS externally.
        /// The client must not set an overall request timeout, or long-lived
        /// streams will be cut off.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        fn name(&self) -> &'static str {
            "http"
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
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| SseError::config(format!("invalid HTTP method: {e}")))?;
            let headers = build_headers(request)?;

            let mut builder = self.client.request(method, &request.url).headers(headers);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            debug!(url = %request.url, method = %request.method, "opening SSE stream");
            let send = async { builder.send().await.map_err(SseError::from) };
            let response = cancellable(send, request.connect_timeout, &cancel).await?;

            let status = response.status();
            if !status.is_success() {
                let wait = request.connect_timeout.unwrap_or(ERROR_BODY_TIMEOUT);
                let body_text = match cancellable(
                    async { Ok(error_body(response).await) },
                    Some(wait),
                    &cancel,
                )
                .await
                {
                    Ok(text) => text,
                    Err(SseError::Cancelled) => return Err(SseError::Cancelled),
                    Err(_) => String::new(),
                };
                return Err(SseError::status(status.as_u16(), body_text));
            }

            let empty = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim() == "0")
                .unwrap_or(false);
            if empty {
                return Err(SseError::protocol("empty body"));
            }

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map(TransportChunk::Bytes).map_err(SseError::from))
                .take_until(cancel.cancelled_owned());
            Ok(stream.boxed())
        }
    }

    /// Managed GET-only strategy backed by `reqwest-eventsource`.
    ///
    /// Frame decoding happens inside `reqwest-eventsource`; its own retry
    /// logic is disabled so reconnection stays with the client. This
    /// strategy is opt-in: [`select_transport`] never picks it.
    ///
    /// Differences from [`HttpTransport`]:
    ///
    /// - Comment lines are consumed by the library, so they never reach
    ///   [`SseHandler::on_heartbeat`](crate::client::SseHandler::on_heartbeat)
    ///   and do not refresh liveness. Only messages do. Servers that keep
    ///   idle streams alive with comments alone will hit the heartbeat
    ///   timeout.
    /// - [`Message::id`] is reported when the event id changes. A frame that
    ///   repeats the previous `id:` value arrives with `id: None`.
    #[derive(Debug, Clone)]
    pub struct EventSourceTransport {
        client: reqwest::Client,
    }

    impl Default for EventSourceTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventSourceTransport {
        /// Create a transport with a default `reqwest::Client`.
        pub fn new() -> Self {
            Self::with_client(default_client())
        }

        /// Create a transport with an existing `reqwest::Client`.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn map_eventsource_error(err: reqwest_eventsource::Error) -> SseError {
        use reqwest_eventsource::Error;

        match err {
            Error::InvalidStatusCode(status, _) => {
                SseError::status(status.as_u16(), "unexpected status for event stream")
            }
            Error::InvalidContentType(content_type, _) => {
                SseError::protocol(format!("unexpected content type {content_type:?}"))
            }
            Error::Transport(e) => SseError::from(e),
            Error::StreamEnded => SseError::protocol("empty body"),
            other => SseError::protocol(other.to_string()),
        }
    }

    #[async_trait]
    impl Transport for EventSourceTransport {
        fn name(&self) -> &'static str {
            "eventsource"
        }

        fn capabilities(&self) -> TransportCapabilities {
            TransportCapabilities {
                custom_headers: false,
                request_body: false,
                any_method: false,
            }
        }

        async fn open(
            &self,
            request: &StreamRequest,
            cancel: CancellationToken,
        ) -> SseResult<TransportStream> {
            if !self.capabilities().supports(request) {
                return Err(SseError::config(
                    "the managed event-source transport only supports plain GET requests; \
                     use HttpTransport for custom headers, bodies, or methods",
                ));
            }

            let mut builder = self.client.get(&request.url);
            if let Some(value) = request.last_event_id.as_deref().and_then(last_event_id_value) {
                builder = builder.header(LAST_EVENT_ID_HEADER, value);
            }

            let mut source = EventSource::new(builder)
                .map_err(|e| SseError::config(format!("cannot build event source: {e}")))?;
            source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

            debug!(url = %request.url, "opening managed SSE stream");
            let first = async {
                match source.next().await {
                    Some(Ok(EsEvent::Open)) => Ok(()),
                    Some(Ok(EsEvent::Message(_))) => Err(SseError::protocol(
                        "event source delivered a message before opening",
                    )),
                    Some(Err(e)) => Err(map_eventsource_error(e)),
                    None => Err(SseError::protocol("empty body")),
                }
            };
            let opened = cancellable(first, request.connect_timeout, &cancel).await;
            if let Err(err) = opened {
                source.close();
                return Err(err);
            }

            // The library's parser starts every connection with an empty id.
            let mut previous_id = String::new();
            let stream = source
                .take_while(|item| {
                    future::ready(!matches!(item, Err(reqwest_eventsource::Error::StreamEnded)))
                })
                .filter_map(move |item| {
                    future::ready(match item {
                        Ok(EsEvent::Open) => None,
                        Ok(EsEvent::Message(event)) => Some(Ok(TransportChunk::Message(Message {
                            id: own_id(&mut previous_id, event.id),
                            data: event.data,
                            event: event.event,
                            retry_hint: event.retry.map(|d| d.as_millis() as u64),
                        }))),
                        Err(e) => Some(Err(map_eventsource_error(e))),
                    })
                })
                .take_until(cancel.cancelled_owned());
            Ok(stream.boxed())
        }
    }

    /// Choose the transport for a configuration.
    ///
    /// Always the manual [`HttpTransport`]: it sends any request and is the
    /// only strategy that sees comment lines, which liveness depends on.
    /// Pass [`EventSourceTransport`] to [`SseClient::new`](crate::client::SseClient::new)
    /// to opt into the managed strategy for plain GET streams.
    pub fn select_transport(config: &ClientConfig) -> Arc<dyn Transport> {
        debug!(url = %config.url, plain_get = config.is_plain_get(), "Selecting manual SSE transport");
        Arc::new(HttpTransport::new())
    }

}

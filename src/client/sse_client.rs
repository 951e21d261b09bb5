//! The resilient SSE client.
//!
//! [`SseClient`] owns one connection lifecycle at a time. `connect()` spawns
//! a driver task on the current tokio runtime; the driver feeds the
//! [`ReconnectState`] machine and carries out the effects it returns:
//! opening the transport, decoding frames, checking liveness, and sleeping
//! out backoff delays. Every callback runs on that driver task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::ClientConfig;
use crate::controller::{Effect, Input, ReconnectState};
use crate::decoder::FrameDecoder;
use crate::error::{SseError, SseResult};
use crate::liveness::LivenessMonitor;
use crate::parser::EventParser;
use crate::types::{ConnectionState, Message};

use super::sse::SseHandler;
use super::transport::{StreamRequest, Transport, TransportChunk, TransportStream};

/// State shared between the client handle and its driver task.
struct Shared {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn SseHandler>,
    state: watch::Sender<ConnectionState>,
    last_event_id: Mutex<Option<String>>,
}

impl Shared {
    fn last_event_id(&self) -> Option<String> {
        lock(&self.last_event_id).clone()
    }

    fn set_last_event_id(&self, id: Option<&str>) {
        let mut current = lock(&self.last_event_id);
        if current.as_deref() != id {
            *current = id.map(str::to_owned);
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl Lifecycle {
    /// Cancel and abort the in-flight driver, if any. Safe to repeat.
    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A Server-Sent Events client with heartbeat detection and automatic
/// reconnection.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use resilient_sse::client::{ChannelHandler, ClientEvent, SseClient};
/// use resilient_sse::ClientConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::new("https://api.example.com/events")
///     .with_heartbeat_timeout(Duration::from_secs(10));
/// let (handler, mut stream) = ChannelHandler::new();
/// let client = SseClient::from_config(config, handler)?;
/// client.connect()?;
///
/// while let Some(event) = stream.next().await {
///     if let ClientEvent::Message(msg) = event {
///         println!("{}", msg.data);
///     }
/// }
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct SseClient {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for SseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseClient")
            .field("url", &self.shared.config.url)
            .field("transport", &self.shared.transport.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SseClient {
    /// Create a client with an explicit transport.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::Config`] if the configuration is invalid or the
    /// transport cannot express the configured request.
    pub fn new<H: SseHandler>(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        handler: H,
    ) -> SseResult<Self> {
        config.validate()?;
        let probe = StreamRequest::from_config(&config, None);
        if !transport.capabilities().supports(&probe) {
            return Err(SseError::config(format!(
                "transport '{}' cannot send this request (custom headers, body, or non-GET method)",
                transport.name()
            )));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let last_event_id = Mutex::new(config.last_event_id.clone());
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                handler: Arc::new(handler),
                state,
                last_event_id,
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Create a client on the default manual HTTP transport.
    ///
    /// See [`select_transport`](super::select_transport).
    ///
    /// # Errors
    ///
    /// Returns [`SseError::Config`] if the configuration is invalid.
    #[cfg(feature = "client")]
    pub fn from_config<H: SseHandler>(config: ClientConfig, handler: H) -> SseResult<Self> {
        let transport = super::select_transport(&config);
        Self::new(config, transport, handler)
    }

    /// Start (or restart) the connection lifecycle.
    ///
    /// Any in-flight connection is torn down first: its read loop is
    /// cancelled and its timers are dropped. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SseError::Closed`] if [`close`](Self::close) was called
    /// - [`SseError::Config`] if no tokio runtime is available
    pub fn connect(&self) -> SseResult<()> {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.closed {
            return Err(SseError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SseError::config(format!("connect() requires a tokio runtime: {e}")))?;

        lifecycle.teardown();

        let cancel = CancellationToken::new();
        let driver = Driver::new(Arc::clone(&self.shared), cancel.clone());
        lifecycle.task = Some(runtime.spawn(driver.run()));
        lifecycle.cancel = Some(cancel);
        Ok(())
    }

    /// Close the client permanently.
    ///
    /// Cancels the in-flight connection, reports
    /// [`ConnectionState::Disconnected`] if the client was not already
    /// disconnected, and never reports an error. Safe to call repeatedly.
    pub fn close(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
            lifecycle.teardown();
        }

        let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            self.shared
                .handler
                .on_connection_status(ConnectionState::Disconnected);
        }
        info!(url = %self.shared.config.url, "SSE client closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.lifecycle).closed
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The resume point sent as `Last-Event-ID` on the next connection.
    pub fn last_event_id(&self) -> Option<String> {
        self.shared.last_event_id()
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        lock(&self.lifecycle).teardown();
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// One connection lifecycle, running on its own task.
struct Driver {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    machine: ReconnectState,
    policy: BackoffPolicy,
    rng: StdRng,
    stream: Option<TransportStream>,
    liveness: Option<LivenessMonitor>,
}

impl Driver {
    fn new(shared: Arc<Shared>, cancel: CancellationToken) -> Self {
        let rng = match shared.config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            policy: shared.config.backoff_policy(),
            shared,
            cancel,
            machine: ReconnectState::new(),
            rng,
            stream: None,
            liveness: None,
        }
    }

    async fn run(mut self) {
        let max_attempts = self.shared.config.max_reconnect_attempts;
        let mut inputs = VecDeque::from([Input::Connect]);

        while let Some(input) = inputs.pop_front() {
            let transition = self.machine.next(input, max_attempts);
            self.machine = transition.state;

            for effect in transition.effects {
                if let Some(next) = self.apply(effect).await {
                    inputs.push_back(next);
                }
            }

            if self.machine.state == ConnectionState::Connected && inputs.is_empty() {
                if let Some(stream) = self.stream.take() {
                    inputs.push_back(self.read(stream).await);
                }
            }
        }

        debug!(url = %self.shared.config.url, "SSE driver finished");
    }

    async fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Status(state) => {
                self.emit_status(state);
                None
            }
            Effect::Error(err) => {
                self.emit_error(&err);
                None
            }
            Effect::Open => Some(self.open().await),
            Effect::StartLiveness => {
                self.liveness = Some(LivenessMonitor::new(
                    self.shared.config.heartbeat_timeout,
                    Instant::now(),
                ));
                None
            }
            Effect::StopLiveness => {
                self.liveness = None;
                self.stream = None;
                None
            }
            Effect::ScheduleRetry { backoff_index } => Some(self.backoff(backoff_index).await),
        }
    }

    async fn open(&mut self) -> Input {
        let request = StreamRequest::from_config(&self.shared.config, self.shared.last_event_id());
        debug!(
            url = %request.url,
            transport = self.shared.transport.name(),
            last_event_id = ?request.last_event_id,
            "Opening SSE connection"
        );

        match self.shared.transport.open(&request, self.cancel.clone()).await {
            Ok(stream) => {
                info!(url = %request.url, "SSE connection established");
                self.stream = Some(stream);
                Input::Opened
            }
            Err(err) => Input::Failed(err),
        }
    }

    async fn backoff(&mut self, backoff_index: usize) -> Input {
        let delay = self.policy.delay(backoff_index, &mut self.rng);
        info!(
            attempt = self.machine.attempt,
            max_attempts = self.shared.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling SSE reconnect"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Input::Cancelled,
            _ = tokio::time::sleep(delay) => Input::BackoffElapsed,
        }
    }

    /// Read the open stream until it fails, ends, or is cancelled.
    async fn read(&mut self, mut stream: TransportStream) -> Input {
        let mut decoder = FrameDecoder::new();
        let mut parser = EventParser::with_last_event_id(self.shared.last_event_id());

        let period = self.shared.config.effective_check_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Input::Cancelled,

                _ = ticker.tick() => {
                    if let Some(err) = self.liveness.as_mut().and_then(|m| m.check(Instant::now())) {
                        warn!(url = %self.shared.config.url, error = %err, "SSE heartbeat timeout");
                        return Input::Failed(err);
                    }
                }

                item = stream.next() => match item {
                    None => {
                        let dropped = decoder.finish();
                        if dropped > 0 {
                            debug!(bytes = dropped, "Discarding incomplete frame at end of stream");
                        }
                        info!(url = %self.shared.config.url, "SSE stream ended");
                        return Input::Ended;
                    }
                    Some(Err(err)) => {
                        warn!(url = %self.shared.config.url, error = %err, "SSE stream failed");
                        return Input::Failed(err);
                    }
                    Some(Ok(TransportChunk::Bytes(bytes))) => {
                        let before = decoder.completed_lines();
                        let frames = match decoder.feed(&bytes) {
                            Ok(frames) => frames,
                            Err(err) => {
                                warn!(url = %self.shared.config.url, error = %err, "SSE decode failed");
                                return Input::Failed(err);
                            }
                        };
                        if decoder.completed_lines() > before {
                            self.touch();
                        }

                        for frame in frames {
                            let parsed = parser.parse_frame(&frame);
                            self.shared.set_last_event_id(parser.last_event_id());
                            for _ in 0..parsed.comments {
                                self.emit_heartbeat();
                            }
                            if let Some(message) = parsed.message {
                                if let Some(next) = self.dispatch(message) {
                                    return next;
                                }
                            }
                        }
                    }
                    Some(Ok(TransportChunk::Message(message))) => {
                        self.touch();
                        if let Some(id) = message.id.as_deref() {
                            self.shared.set_last_event_id(Some(id).filter(|id| !id.is_empty()));
                        }
                        if let Some(next) = self.dispatch(message) {
                            return next;
                        }
                    }
                },
            }
        }
    }

    fn touch(&mut self) {
        if let Some(monitor) = self.liveness.as_mut() {
            monitor.touch(Instant::now());
        }
    }

    /// Deliver a message. Returns the input that ends the read loop, if any.
    fn dispatch(&self, message: Message) -> Option<Input> {
        if self.cancel.is_cancelled() {
            return Some(Input::Cancelled);
        }

        let terminal = self
            .shared
            .config
            .terminal_event
            .as_deref()
            .is_some_and(|name| name == message.event);

        debug!(event = %message.event, id = ?message.id, "SSE message");
        self.shared.handler.on_message(message);

        terminal.then_some(Input::Ended)
    }

    fn emit_status(&self, state: ConnectionState) {
        // Checked under the watch lock: `close()` cancels before it publishes
        // `Disconnected`, so a late transition can never overwrite it.
        let published = self.shared.state.send_if_modified(|current| {
            if self.cancel.is_cancelled() {
                return false;
            }
            *current = state;
            true
        });
        if !published {
            return;
        }
        debug!(state = %state, "SSE connection state changed");
        self.shared.handler.on_connection_status(state);
    }

    fn emit_error(&self, err: &SseError) {
        if self.cancel.is_cancelled() || err.is_cancellation() {
            return;
        }
        self.shared.handler.on_error(err);
    }

    fn emit_heartbeat(&self) {
        if !self.cancel.is_cancelled() {
            self.shared.handler.on_heartbeat();
        }
    }
}

//! Integration tests for heartbeat liveness detection.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    collect_until_state, count_state, drain, errors, messages, Attempt, ScriptedTransport, Step,
};
use resilient_sse::client::{ChannelHandler, ClientEvent, SseClient, SseHandler, SseStream};
use resilient_sse::{ClientConfig, ConnectionState, Message, SseError};

use ConnectionState::{Connected, Connecting, Reconnecting};

fn config() -> ClientConfig {
    ClientConfig::new("http://test/events")
        .with_heartbeat_timeout(Duration::from_millis(1000))
        .with_initial_backoff(Duration::from_secs(10))
        .with_max_backoff(Duration::from_secs(10))
        .with_jitter_max(Duration::ZERO)
}

fn start(config: ClientConfig, transport: &ScriptedTransport) -> (SseClient, SseStream) {
    let (handler, stream) = ChannelHandler::new();
    let client = SseClient::new(config, Arc::new(transport.clone()), handler).unwrap();
    client.connect().unwrap();
    (client, stream)
}

fn heartbeat_timeouts(events: &[ClientEvent]) -> Vec<SseError> {
    errors(events)
        .into_iter()
        .filter(|e| matches!(e, SseError::HeartbeatTimeout { .. }))
        .collect()
}

/// A silent connection is detected within the timeout plus one check period,
/// and triggers exactly one reconnect.
#[tokio::test(start_paused = true)]
async fn silent_connection_triggers_single_reconnect() {
    let transport = ScriptedTransport::new([
        Attempt::Stream(vec![Step::Hang]),
        Attempt::Stream(vec![Step::Hang]),
    ]);
    let (_client, mut stream) = start(config(), &transport);
    collect_until_state(&mut stream, Connected).await;

    // 1200ms of silence against a 1000ms timeout.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let events = drain(&mut stream);

    assert_eq!(count_state(&events, Reconnecting), 1);
    let timeouts = heartbeat_timeouts(&events);
    assert_eq!(timeouts.len(), 1);
    match &timeouts[0] {
        SseError::HeartbeatTimeout { elapsed, timeout } => {
            assert_eq!(*timeout, Duration::from_millis(1000));
            assert!(*elapsed > Duration::from_millis(1000));
            assert!(*elapsed < Duration::from_millis(1200));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The retry waits out its backoff first.
    assert_eq!(count_state(&events, Connecting), 0);
    assert_eq!(transport.open_count(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let events = drain(&mut stream);
    assert_eq!(
        common::statuses(&events),
        vec![Connecting, Connected]
    );
}

#[tokio::test(start_paused = true)]
async fn comments_keep_connection_alive() {
    let ping = || [Step::Sleep(Duration::from_millis(600)), Step::text(": ping\n\n")];
    let mut steps: Vec<Step> = (0..5).flat_map(|_| ping()).collect();
    steps.push(Step::Hang);

    let transport = ScriptedTransport::new([Attempt::Stream(steps)]);
    let (_client, mut stream) = start(config(), &transport);
    collect_until_state(&mut stream, Connected).await;

    tokio::time::sleep(Duration::from_millis(2900)).await;
    let events = drain(&mut stream);
    let heartbeats = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::Heartbeat))
        .count();
    assert_eq!(heartbeats, 4);
    assert!(errors(&events).is_empty());
    assert!(messages(&events).is_empty());

    // Pings stop after 3000ms; silence is detected afterwards.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let events = drain(&mut stream);
    assert_eq!(heartbeat_timeouts(&events).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn data_frames_keep_connection_alive() {
    let transport = ScriptedTransport::new([Attempt::Stream(vec![
        Step::Sleep(Duration::from_millis(800)),
        Step::text("data: a\n\n"),
        Step::Sleep(Duration::from_millis(800)),
        Step::text("data: b\n\n"),
        Step::Hang,
    ])]);
    let (_client, mut stream) = start(config(), &transport);
    collect_until_state(&mut stream, Connected).await;

    tokio::time::sleep(Duration::from_millis(2000)).await;
    let events = drain(&mut stream);
    assert_eq!(messages(&events), vec![Message::new("a"), Message::new("b")]);
    assert!(errors(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn partial_line_does_not_count_as_activity() {
    let transport = ScriptedTransport::new([Attempt::Stream(vec![
        Step::Sleep(Duration::from_millis(900)),
        Step::text("data: no line ending yet"),
        Step::Hang,
    ])]);
    let (_client, mut stream) = start(config(), &transport);
    collect_until_state(&mut stream, Connected).await;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let events = drain(&mut stream);
    assert_eq!(heartbeat_timeouts(&events).len(), 1);
    assert_eq!(count_state(&events, Reconnecting), 1);
}

#[tokio::test(start_paused = true)]
async fn managed_messages_keep_connection_alive() {
    let transport = ScriptedTransport::new([Attempt::Stream(vec![
        Step::Sleep(Duration::from_millis(700)),
        Step::Message(Message::new("one")),
        Step::Sleep(Duration::from_millis(700)),
        Step::Message(Message::new("two")),
        Step::Hang,
    ])]);
    let (_client, mut stream) = start(config(), &transport);
    collect_until_state(&mut stream, Connected).await;

    tokio::time::sleep(Duration::from_millis(1900)).await;
    let events = drain(&mut stream);
    assert_eq!(messages(&events).len(), 2);
    assert!(errors(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn short_timeout_checked_faster_than_default_interval() {
    // The default check interval is 5s; a 400ms timeout must still be
    // detected long before that.
    let transport = ScriptedTransport::new([Attempt::Stream(vec![Step::Hang])]);
    let (_client, mut stream) = start(
        config().with_heartbeat_timeout(Duration::from_millis(400)),
        &transport,
    );
    collect_until_state(&mut stream, Connected).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(heartbeat_timeouts(&drain(&mut stream)).len(), 1);
}

/// A hand-written handler relying on the trait's default methods.
#[derive(Default)]
struct CountingHandler {
    messages: Mutex<Vec<Message>>,
    heartbeats: AtomicUsize,
}

impl SseHandler for CountingHandler {
    fn on_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    fn on_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn custom_handler_receives_callbacks() {
    let transport = ScriptedTransport::new([Attempt::Stream(vec![Step::text(
        ": hb\n\ndata: x\n\n: hb\n\n",
    )])]);
    let handler = Arc::new(CountingHandler::default());
    let client = SseClient::new(config(), Arc::new(transport), Arc::clone(&handler)).unwrap();
    client.connect().unwrap();

    // The body ends after one chunk, so the client settles quickly.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(*handler.messages.lock().unwrap(), vec![Message::new("x")]);
    assert_eq!(handler.heartbeats.load(Ordering::SeqCst), 2);
}

//! Client configuration.
//!
//! [`ClientConfig`] is immutable once handed to an
//! [`SseClient`](crate::client::SseClient). Build it with the `with_*`
//! methods, or deserialize it from JSON where durations are given in
//! milliseconds (`heartbeatTimeoutMs`, `initialBackoffMs`, ...).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::{SseError, SseResult};

/// Default number of consecutive failed attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default liveness timeout.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(15_000);
/// Default first backoff delay.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1_000);
/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(30_000);
/// Default upper bound (exclusive) of the random jitter added to each delay.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(500);
/// Default cadence of the liveness check.
pub const DEFAULT_LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for one [`SseClient`](crate::client::SseClient) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Stream endpoint URL.
    pub url: String,
    /// HTTP method. Defaults to `GET`.
    pub method: String,
    /// Additional HTTP headers sent on every (re)connection.
    pub headers: HashMap<String, String>,
    /// Optional request body.
    pub body: Option<String>,
    /// Consecutive failed attempts allowed before the client disconnects.
    pub max_reconnect_attempts: u32,
    /// Silence after which the connection is declared dead.
    #[serde(rename = "heartbeatTimeoutMs", with = "duration_ms")]
    pub heartbeat_timeout: Duration,
    /// First entry of the backoff schedule.
    #[serde(rename = "initialBackoffMs", with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Ceiling applied to every backoff delay, jitter included.
    #[serde(rename = "maxBackoffMs", with = "duration_ms")]
    pub max_backoff: Duration,
    /// Jitter is sampled uniformly from `[0, jitter_max)`.
    #[serde(rename = "jitterMaxMs", with = "duration_ms")]
    pub jitter_max: Duration,
    /// Seed for the jitter RNG. `None` seeds from the OS.
    pub jitter_seed: Option<u64>,
    /// How often the liveness monitor is checked.
    #[serde(rename = "livenessCheckIntervalMs", with = "duration_ms")]
    pub liveness_check_interval: Duration,
    /// Optional timeout on opening the transport.
    #[serde(rename = "connectTimeoutMs", with = "option_duration_ms")]
    pub connect_timeout: Option<Duration>,
    /// Event type after which the stream is considered complete.
    pub terminal_event: Option<String>,
    /// Initial `Last-Event-ID` to resume from.
    pub last_event_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter_max: DEFAULT_JITTER_MAX,
            jitter_seed: None,
            liveness_check_interval: DEFAULT_LIVENESS_CHECK_INTERVAL,
            connect_timeout: None,
            terminal_event: None,
            last_event_id: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json(json: &str) -> SseResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SseError::config(format!("failed to parse client config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the HTTP method (builder-style).
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    /// Add a custom header (builder-style).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add an `Authorization: Bearer <token>` header (builder-style).
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.with_header("Authorization", value)
    }

    /// Set the request body (builder-style).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the number of consecutive failures tolerated (builder-style).
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the liveness timeout (builder-style).
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the first backoff delay (builder-style).
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the backoff ceiling (builder-style).
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the jitter bound (builder-style).
    pub fn with_jitter_max(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    /// Seed the jitter RNG for reproducible delays (builder-style).
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Set the liveness check cadence (builder-style).
    pub fn with_liveness_check_interval(mut self, interval: Duration) -> Self {
        self.liveness_check_interval = interval;
        self
    }

    /// Set a timeout on opening the transport (builder-style).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Close cleanly after a message with this event type (builder-style).
    pub fn with_terminal_event(mut self, event: impl Into<String>) -> Self {
        self.terminal_event = Some(event.into());
        self
    }

    /// Resume from the given event id on the first connection (builder-style).
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    /// Returns `true` if the request is a plain GET without headers or body.
    ///
    /// Only such requests can be served by the managed
    /// [`EventSourceTransport`](crate::client::EventSourceTransport).
    pub fn is_plain_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET") && self.headers.is_empty() && self.body.is_none()
    }

    /// Liveness check cadence actually used by the client.
    ///
    /// Clamped to a tenth of the heartbeat timeout so short timeouts are
    /// detected without waiting for a full default interval.
    pub fn effective_check_interval(&self) -> Duration {
        let tenth = self.heartbeat_timeout / 10;
        self.liveness_check_interval
            .min(tenth)
            .max(Duration::from_millis(1))
    }

    /// Backoff policy derived from this configuration.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.initial_backoff, self.max_backoff, self.jitter_max)
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> SseResult<()> {
        if self.url.trim().is_empty() {
            return Err(SseError::config("url must not be empty"));
        }
        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(SseError::config(format!(
                "invalid HTTP method '{}'",
                self.method
            )));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(SseError::config("heartbeat timeout must be > 0"));
        }
        if self.initial_backoff.is_zero() {
            return Err(SseError::config("initial backoff must be > 0"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(SseError::config(
                "max backoff must be >= initial backoff",
            ));
        }
        if self.liveness_check_interval.is_zero() {
            return Err(SseError::config("liveness check interval must be > 0"));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

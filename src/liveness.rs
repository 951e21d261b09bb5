//! Heartbeat-based liveness detection.
//!
//! Proxies and load balancers can keep a TCP connection open while no bytes
//! flow. The monitor records the time of the last received line (data and
//! comments alike) and reports a [`SseError::HeartbeatTimeout`] once that
//! silence exceeds the configured timeout.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::SseError;

/// Tracks the recency of stream activity.
///
/// Time is always passed in, so the monitor itself never reads a clock.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    timeout: Duration,
    last_activity: Instant,
    tripped: bool,
}

impl LivenessMonitor {
    /// Start monitoring with `now` as the last activity.
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_activity: now,
            tripped: false,
        }
    }

    /// Record activity. Re-arms the monitor after a timeout.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        self.tripped = false;
    }

    /// Time of the last recorded activity.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check for a timeout.
    ///
    /// Returns the error at most once per silence episode; later checks return
    /// `None` until [`touch`](Self::touch) is called again.
    pub fn check(&mut self, now: Instant) -> Option<SseError> {
        if self.tripped {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_activity);
        if elapsed > self.timeout {
            self.tripped = true;
            return Some(SseError::HeartbeatTimeout {
                elapsed,
                timeout: self.timeout,
            });
        }
        None
    }
}

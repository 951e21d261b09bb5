//! Reconnection state machine.
//!
//! The controller is a pure function from `(state, input)` to
//! `(state, effects)`. It performs no I/O and reads no clock: the client
//! driver feeds it inputs and carries out the returned [`Effect`]s in order.
//!
//! ```text
//!              Connect
//!                 │
//!                 ▼
//!   ┌──────► Connecting ──Opened──► Connected
//!   │             │                    │
//!   │          Failed               Failed
//! BackoffElapsed  │                    │
//!   │             ▼                    │
//!   └──────  Reconnecting ◄────────────┘
//!
//!   any ──Cancelled / Ended / attempts exhausted──► Disconnected
//! ```

use crate::error::SseError;
use crate::types::ConnectionState;

/// Inputs driving the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The consumer called `connect()`.
    Connect,
    /// The transport opened successfully.
    Opened,
    /// The transport, decoder, or liveness monitor failed.
    Failed(SseError),
    /// The stream ended cleanly.
    Ended,
    /// The backoff delay elapsed.
    BackoffElapsed,
    /// The consumer cancelled the connection.
    Cancelled,
}

/// Side effects requested by a transition, to be applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Report a new connection state.
    Status(ConnectionState),
    /// Report an error to the consumer.
    Error(SseError),
    /// Open the transport.
    Open,
    /// Start the liveness monitor.
    StartLiveness,
    /// Stop the liveness monitor.
    StopLiveness,
    /// Wait out the backoff delay for the given schedule index, then feed
    /// [`Input::BackoffElapsed`].
    ScheduleRetry {
        /// 0-based retry index since the last successful connection.
        backoff_index: usize,
    },
}

/// Reconnection bookkeeping for one client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    /// Current connection state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful connection.
    pub attempt: u32,
    /// Index into the backoff schedule of the pending retry.
    pub backoff_index: usize,
}

/// Outcome of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the transition.
    pub state: ReconnectState,
    /// Effects to apply, in order.
    pub effects: Vec<Effect>,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectState {
    /// A fresh, disconnected state.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            backoff_index: 0,
        }
    }

    /// Compute the transition for `input`.
    ///
    /// Inputs that make no sense in the current state (for example
    /// `BackoffElapsed` while connected) leave the state unchanged and
    /// produce no effects.
    pub fn next(self, input: Input, max_attempts: u32) -> Transition {
        use crate::types::ConnectionState::*;

        match (self.state, input) {
            (_, Input::Connect) => Transition {
                state: Self {
                    state: Connecting,
                    attempt: 0,
                    backoff_index: 0,
                },
                effects: self
                    .stop_liveness()
                    .into_iter()
                    .chain([Effect::Status(Connecting), Effect::Open])
                    .collect(),
            },

            (Connecting, Input::Opened) => Transition {
                state: Self {
                    state: Connected,
                    attempt: 0,
                    backoff_index: 0,
                },
                effects: vec![Effect::Status(Connected), Effect::StartLiveness],
            },

            (Connecting | Connected, Input::Failed(err)) if err.is_cancellation() => {
                self.next(Input::Cancelled, max_attempts)
            }

            (Connecting | Connected, Input::Failed(err)) => {
                let attempt = self.attempt.saturating_add(1);
                let mut effects = self.stop_liveness();

                if !err.is_retryable() {
                    effects.push(Effect::Status(Disconnected));
                    effects.push(Effect::Error(err));
                    return Transition {
                        state: Self {
                            state: Disconnected,
                            attempt,
                            backoff_index: self.backoff_index,
                        },
                        effects,
                    };
                }

                if attempt >= max_attempts {
                    effects.push(Effect::Status(Disconnected));
                    effects.push(Effect::Error(SseError::MaxAttemptsReached {
                        attempts: attempt,
                        last: Box::new(err),
                    }));
                    return Transition {
                        state: Self {
                            state: Disconnected,
                            attempt,
                            backoff_index: self.backoff_index,
                        },
                        effects,
                    };
                }

                let backoff_index = (attempt - 1) as usize;
                effects.push(Effect::Error(err));
                effects.push(Effect::Status(Reconnecting));
                effects.push(Effect::ScheduleRetry { backoff_index });
                Transition {
                    state: Self {
                        state: Reconnecting,
                        attempt,
                        backoff_index,
                    },
                    effects,
                }
            }

            (Connecting | Connected, Input::Ended) => Transition {
                state: Self {
                    state: Disconnected,
                    ..self
                },
                effects: self
                    .stop_liveness()
                    .into_iter()
                    .chain([Effect::Status(Disconnected)])
                    .collect(),
            },

            (Reconnecting, Input::BackoffElapsed) => Transition {
                state: Self {
                    state: Connecting,
                    ..self
                },
                effects: vec![Effect::Status(Connecting), Effect::Open],
            },

            (Connecting | Connected | Reconnecting, Input::Cancelled) => Transition {
                state: Self {
                    state: Disconnected,
                    ..self
                },
                effects: self
                    .stop_liveness()
                    .into_iter()
                    .chain([Effect::Status(Disconnected)])
                    .collect(),
            },

            (_, _) => Transition {
                state: self,
                effects: Vec::new(),
            },
        }
    }

    fn stop_liveness(&self) -> Vec<Effect> {
        if self.state == ConnectionState::Connected {
            vec![Effect::StopLiveness]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState::*;

    const MAX: u32 = 5;

    fn connected() -> ReconnectState {
        let t = ReconnectState::new().next(Input::Connect, MAX);
        t.state.next(Input::Opened, MAX).state
    }

    fn transport_err() -> SseError {
        SseError::status(503, "unavailable")
    }

    #[test]
    fn connect_then_open() {
        let t = ReconnectState::new().next(Input::Connect, MAX);
        assert_eq!(t.state.state, Connecting);
        assert_eq!(t.effects, vec![Effect::Status(Connecting), Effect::Open]);

        let t = t.state.next(Input::Opened, MAX);
        assert_eq!(t.state.state, Connected);
        assert_eq!(t.state.attempt, 0);
        assert_eq!(
            t.effects,
            vec![Effect::Status(Connected), Effect::StartLiveness]
        );
    }

    #[test]
    fn failure_while_connected_schedules_retry() {
        let t = connected().next(Input::Failed(transport_err()), MAX);
        assert_eq!(t.state.state, Reconnecting);
        assert_eq!(t.state.attempt, 1);
        assert_eq!(
            t.effects,
            vec![
                Effect::StopLiveness,
                Effect::Error(transport_err()),
                Effect::Status(Reconnecting),
                Effect::ScheduleRetry { backoff_index: 0 },
            ]
        );

        let t = t.state.next(Input::BackoffElapsed, MAX);
        assert_eq!(t.state.state, Connecting);
        assert_eq!(t.effects, vec![Effect::Status(Connecting), Effect::Open]);
    }

    #[test]
    fn success_resets_attempts() {
        let mut state = ReconnectState::new().next(Input::Connect, MAX).state;
        for _ in 0..3 {
            state = state.next(Input::Failed(transport_err()), MAX).state;
            state = state.next(Input::BackoffElapsed, MAX).state;
        }
        assert_eq!(state.attempt, 3);
        let state = state.next(Input::Opened, MAX).state;
        assert_eq!(state.attempt, 0);
    }

    #[test]
    fn backoff_index_tracks_consecutive_failures() {
        let mut state = ReconnectState::new().next(Input::Connect, MAX).state;
        let mut indices = Vec::new();
        for _ in 0..4 {
            let t = state.next(Input::Failed(transport_err()), MAX);
            indices.extend(t.effects.iter().filter_map(|e| match e {
                Effect::ScheduleRetry { backoff_index } => Some(*backoff_index),
                _ => None,
            }));
            state = t.state.next(Input::BackoffElapsed, MAX).state;
        }
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn exhaustion_emits_one_terminal_error() {
        let mut state = ReconnectState::new().next(Input::Connect, MAX).state;
        let mut all_effects = Vec::new();
        for _ in 0..MAX {
            let t = state.next(Input::Failed(transport_err()), MAX);
            all_effects.extend(t.effects);
            state = t.state;
            if state.state == Reconnecting {
                let t = state.next(Input::BackoffElapsed, MAX);
                all_effects.extend(t.effects);
                state = t.state;
            }
        }

        assert_eq!(state.state, Disconnected);
        let terminal: Vec<_> = all_effects
            .iter()
            .filter(|e| matches!(e, Effect::Error(SseError::MaxAttemptsReached { .. })))
            .collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(
            all_effects.last(),
            Some(&Effect::Error(SseError::MaxAttemptsReached {
                attempts: MAX,
                last: Box::new(transport_err()),
            }))
        );

        // Nothing further happens once disconnected.
        let t = state.next(Input::BackoffElapsed, MAX);
        assert!(t.effects.is_empty());
        let t = state.next(Input::Failed(transport_err()), MAX);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn cancel_while_reconnecting_is_silent() {
        let state = connected().next(Input::Failed(transport_err()), MAX).state;
        let t = state.next(Input::Cancelled, MAX);
        assert_eq!(t.state.state, Disconnected);
        assert_eq!(t.effects, vec![Effect::Status(Disconnected)]);

        let t = t.state.next(Input::BackoffElapsed, MAX);
        assert_eq!(t.state.state, Disconnected);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn cancellation_error_routes_to_disconnected_without_error() {
        let t = connected().next(Input::Failed(SseError::Cancelled), MAX);
        assert_eq!(t.state.state, Disconnected);
        assert_eq!(
            t.effects,
            vec![Effect::StopLiveness, Effect::Status(Disconnected)]
        );
    }

    #[test]
    fn clean_end_disconnects_without_retry() {
        let t = connected().next(Input::Ended, MAX);
        assert_eq!(t.state.state, Disconnected);
        assert_eq!(
            t.effects,
            vec![Effect::StopLiveness, Effect::Status(Disconnected)]
        );
    }

    #[test]
    fn non_retryable_failure_is_terminal() {
        let t = ReconnectState::new()
            .next(Input::Connect, MAX)
            .state
            .next(Input::Failed(SseError::config("bad url")), MAX);
        assert_eq!(t.state.state, Disconnected);
        assert_eq!(
            t.effects,
            vec![
                Effect::Status(Disconnected),
                Effect::Error(SseError::config("bad url")),
            ]
        );
    }

    #[test]
    fn heartbeat_timeout_is_retried() {
        let err = SseError::HeartbeatTimeout {
            elapsed: std::time::Duration::from_millis(1250),
            timeout: std::time::Duration::from_millis(1000),
        };
        let t = connected().next(Input::Failed(err), MAX);
        assert_eq!(t.state.state, Reconnecting);
    }

    #[test]
    fn zero_attempts_fails_immediately() {
        let t = ReconnectState::new()
            .next(Input::Connect, 0)
            .state
            .next(Input::Failed(transport_err()), 0);
        assert_eq!(t.state.state, Disconnected);
    }
}

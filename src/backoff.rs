//! Bounded exponential backoff with additive jitter.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule used by the reconnection controller.
///
/// The schedule starts at the initial delay and doubles until it reaches the
/// ceiling; with the defaults this is 1s, 2s, 4s, 8s, 16s, 30s. Each delay gets
/// a fresh jitter sample from `[0, jitter_max)` and is then capped at the
/// ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
    max_delay: Duration,
    jitter_max: Duration,
}

impl BackoffPolicy {
    /// Build the doubling schedule from `initial` up to `max`.
    pub fn new(initial: Duration, max: Duration, jitter_max: Duration) -> Self {
        let mut schedule = Vec::new();
        let mut delay = initial.max(Duration::from_millis(1));
        while delay < max {
            schedule.push(delay);
            delay = delay.saturating_mul(2);
        }
        schedule.push(max);

        Self {
            schedule,
            max_delay: max,
            jitter_max,
        }
    }

    /// Use an explicit ascending schedule instead of the doubling one.
    pub fn with_schedule(schedule: Vec<Duration>, max: Duration, jitter_max: Duration) -> Self {
        let schedule = if schedule.is_empty() { vec![max] } else { schedule };
        Self {
            schedule,
            max_delay: max,
            jitter_max,
        }
    }

    /// The base delays, without jitter.
    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Base delay for the `index`-th retry since the last successful connection.
    pub fn base_delay(&self, index: usize) -> Duration {
        let last = self.schedule.len() - 1;
        self.schedule[index.min(last)]
    }

    /// Full delay for the `index`-th retry: base plus jitter, capped.
    pub fn delay<R: Rng>(&self, index: usize, rng: &mut R) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        let jitter = if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.random_range(0..max_ms))
        };
        (self.base_delay(index) + jitter).min(self.max_delay)
    }
}

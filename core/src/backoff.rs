//! Delay schedules for polling loops.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay policy between polling attempts, as written in fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay between every attempt.
    Fixed { delay_ms: u64 },
    /// Doubling delay starting at `initial_ms`, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl BackoffPolicy {
    /// Fixed delay policy.
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Starts a fresh schedule for this policy.
    pub fn start(&self) -> Backoff {
        match *self {
            BackoffPolicy::Fixed { delay_ms } => Backoff::fixed(Duration::from_millis(delay_ms)),
            BackoffPolicy::Exponential { initial_ms, max_ms } => Backoff::exponential(
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
            ),
        }
    }
}

/// A running delay schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    max: Duration,
    current: Duration,
    factor: u32,
}

impl Backoff {
    /// Constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max: delay,
            current: delay,
            factor: 1,
        }
    }

    /// Exponential backoff starting at `initial`, capping at `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            max,
            current: initial,
            factor: 2,
        }
    }

    /// Returns the current delay.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advances to the next delay.
    pub fn next(&mut self) {
        self.current = self
            .current
            .checked_mul(self.factor)
            .unwrap_or(self.max)
            .min(self.max);
    }
}

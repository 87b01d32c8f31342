//! Retry policy for transient fetch failures
//!
//! Backoff grows exponentially from `initial_backoff` and is capped at
//! `max_backoff`, so the delay never shrinks from one attempt to the next.

use crate::config::CrawlerConfig;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Claims allowed per queue item
    pub retry_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retry_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            retry_attempts,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_backoff),
            Duration::from_millis(config.max_retry_backoff),
        )
    }

    /// Whether an item that has been claimed `attempts` times may be requeued
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.retry_attempts
    }

    /// Backoff to wait after the `attempt`-th failed claim (1-based)
    ///
    /// Yields `initial, 2*initial, 4*initial, ...` capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        // ExponentialBackoff::from_millis(2).factor(f) yields 2f, 4f, 8f, ...
        let initial_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let doubled = ExponentialBackoff::from_millis(2)
            .factor(initial_ms)
            .max_delay(self.max_backoff);

        std::iter::once(self.initial_backoff)
            .chain(doubled)
            .map(|delay| delay.min(self.max_backoff))
            .nth(attempt.saturating_sub(1) as usize)
            .unwrap_or(self.max_backoff)
    }
}

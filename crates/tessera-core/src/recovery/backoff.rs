//! Backoff timing for retried requests

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry budget and exponential backoff timing
///
/// `max_retries` is the total number of attempts made. The delay after a
/// failed attempt `n` (1-based) is `base_delay * 2^(n-1)`: 1s, 2s, 4s, …
/// for the default one-second base. No jitter is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_retries: u32,
    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Number of attempts actually made; a zero budget still tries once
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Sum of every delay a fully exhausted run waits
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

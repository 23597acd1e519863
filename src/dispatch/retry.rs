//! Bounded retry with exponential backoff.

use crate::error::Result;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry a fallible call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub attempts: u32,
    /// Sleep before the second attempt; doubled for each further attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy with `attempts` tries and an initial `backoff`.
    #[must_use]
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Policy that retries without sleeping.
    #[must_use]
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    /// Run `op` until it succeeds or attempts are exhausted, returning the
    /// last error. Blocks the calling thread while backing off.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    warn!("{what} failed (attempt {attempt}/{}): {e}", self.attempts);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::constants::retry::QUERY_ATTEMPTS,
            Duration::from_millis(crate::constants::retry::BACKOFF_MS),
        )
    }
}

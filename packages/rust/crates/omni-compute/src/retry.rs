//! Bounded exponential backoff for rate-limited operations.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Retries an operation only while it fails with a rate-limit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(1_u32 << shift)
    }

    /// Run `operation`, retrying rate-limited failures with doubling delays.
    ///
    /// Any other failure propagates on the attempt that produced it. After
    /// `max_attempts` calls the last rate-limit failure is returned without a
    /// further wait.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1_u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_rate_limited() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(
                        event = "compute.retry.rate_limited",
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_rate_limited() {
                        tracing::warn!(
                            event = "compute.retry.exhausted",
                            label,
                            attempts = attempt,
                            error = %error,
                            "rate limit retries exhausted"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}


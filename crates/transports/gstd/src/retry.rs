//! Retry with exponential backoff for establishing daemon connections
//!
//! Only connection attempts are retried. A command that reached the daemon
//! is never replayed, since creating, playing or deleting twice is not
//! idempotent.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,

    /// Initial backoff in milliseconds, doubled on each attempt
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 200,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, with ±25% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_ms.saturating_mul(2_u64.saturating_pow(attempt - 1));

        // Jitter so reconnecting clients do not hit the daemon in lockstep
        let jitter_range = (backoff / 4) as i64;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range as f64;
        let backoff_with_jitter = ((backoff as i64) + jitter as i64).max(0) as u64;

        Duration::from_millis(backoff_with_jitter)
    }
}

/// Retry executor with exponential backoff
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation` until it succeeds or the attempts run out
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - Operation succeeded (possibly after retries)
    /// * `Err(E)` - Last error once all retries are exhausted
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempts = 0;
        let max_attempts = self.config.max_retries + 1;

        loop {
            attempts += 1;

            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!("Operation succeeded after {} attempts", attempts);
                    }
                    return Ok(result);
                }
                Err(e) if attempts < max_attempts => {
                    let backoff = self.config.backoff(attempts);
                    warn!(
                        "Operation failed (attempt {}/{}): {} - retrying in {}ms",
                        attempts,
                        max_attempts,
                        e,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!("Operation failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

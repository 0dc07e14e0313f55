//! Retry policy for cluster API calls.
//!
//! Orchestration APIs return conflict, timeout and throttling responses
//! under load. Calls made by probes go through [`RetryPolicy::retry`], which
//! repeats the call on a fixed interval while the error stays transient.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;

/// Fixed-interval retry policy with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub base_delay: Duration,
    /// Extra random delay as a fraction of `base_delay` (0.1 = up to +10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the next attempt. The interval does not grow.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.jitter <= 0.0 {
            return self.base_delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..=self.jitter);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
    }

    /// Run `operation`, retrying while it fails with a transient error.
    ///
    /// Non-transient errors are returned on first occurrence. When every
    /// attempt fails transiently the last error is returned.
    ///
    /// # Errors
    ///
    /// Returns the operation's error once retries are exhausted or the
    /// error is not retry-worthy.
    pub async fn retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.next_delay();
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Transient API error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(
                        operation = %operation_name,
                        attempt,
                        transient = e.is_transient(),
                        "Giving up on operation"
                    );
                    return Err(e);
                }
            }
        }
    }
}

//! Polling loop shared by every "wait for X" operation.
//!
//! The waiter only drives the polling mechanics. It hands back the last
//! value it fetched, whether the predicate held or the timeout expired,
//! and the caller decides whether that state is good enough.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Default ceiling for a single wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default delay between two fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of looking up an object that may have been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The object still exists.
    Found(T),
    /// The API reported the object as absent.
    Gone,
}

impl<T> Lookup<T> {
    /// Turn the result of a `get` into a lookup, mapping 404 to [`Lookup::Gone`].
    ///
    /// # Errors
    ///
    /// Any error other than not-found is passed through.
    pub fn from_get(result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Self::Found(value)),
            Err(e) if e.is_not_found() => Ok(Self::Gone),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone)
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Waiter {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Waiter {
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Fetch until `predicate` holds or the timeout elapses.
    ///
    /// Returns the last fetched value in both cases; running out of time is
    /// not an error here. A failing fetch ends the loop immediately.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `fetch`.
    pub async fn poll<T, F, Fut, P>(&self, mut fetch: F, predicate: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
    {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let value = fetch().await?;

            if predicate(&value) {
                debug!(polls, elapsed_ms = start.elapsed().as_millis(), "Wait condition met");
                return Ok(value);
            }

            if start.elapsed() >= self.timeout {
                debug!(
                    polls,
                    timeout_secs = self.timeout.as_secs(),
                    "Wait ceiling reached"
                );
                return Ok(value);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll a lookup until the object is gone or the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `fetch`.
    pub async fn poll_gone<T, F, Fut>(&self, fetch: F) -> Result<Lookup<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Lookup<T>>>,
    {
        self.poll(fetch, Lookup::is_gone).await
    }
}

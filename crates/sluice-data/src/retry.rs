//! Retry-with-backoff combinator for contended mutations.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Outcome of a [`RetryPolicy::run`] call that did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier marked the error as non-retryable.
    #[error("operation failed")]
    Fatal(E),
    /// Every attempt failed with a retryable error.
    #[error("retries exhausted")]
    Exhausted {
        /// Operation identifier.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },
}

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Build a policy; at least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `action` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Fatal`] for non-retryable failures and
    /// [`RetryError::Exhausted`] when every attempt hit a retryable one.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        operation: &'static str,
        is_retryable: C,
        mut action: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
                Err(err) if attempt >= attempts => {
                    warn!(
                        operation,
                        attempts,
                        error = %err,
                        "persistence retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        operation,
                        attempts,
                        last: err,
                    });
                }
                Err(err) => {
                    debug!(operation, attempt, error = %err, "retrying contended operation");
                    attempt += 1;
                    sleep(self.backoff).await;
                }
            }
        }
    }
}

//! Fixed-backoff retry for transient remote failures.

use flowsphere_remote::RemoteError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times a read is retried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub extra_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            extra_attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            extra_attempts: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Set the number of extra attempts.
    #[must_use]
    pub const fn with_extra_attempts(mut self, extra_attempts: u32) -> Self {
        self.extra_attempts = extra_attempts;
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which [`RemoteError::is_transient`] holds are retried.
    ///
    /// # Errors
    /// Returns the last error seen.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt <= self.extra_attempts => {
                    warn!(label, attempt, error = %err, "Transient failure; retrying");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

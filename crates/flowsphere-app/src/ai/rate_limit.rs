//! Sliding-window request limiter.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Allows at most `limit` acquisitions in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter over an arbitrary window.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            limit,
            window,
            hits: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    /// Limiter over a rolling minute.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Take a slot at `now`.
    ///
    /// # Errors
    /// Returns how long until the oldest slot frees up when the window is full.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        while hits
            .front()
            .is_some_and(|hit| now.saturating_duration_since(*hit) >= self.window)
        {
            hits.pop_front();
        }
        if hits.len() >= self.limit {
            let retry_after = hits.front().map_or(self.window, |oldest| {
                self.window
                    .saturating_sub(now.saturating_duration_since(*oldest))
            });
            return Err(retry_after);
        }
        hits.push_back(now);
        Ok(())
    }

    /// Take a slot now.
    ///
    /// # Errors
    /// See [`Self::try_acquire_at`].
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }
}

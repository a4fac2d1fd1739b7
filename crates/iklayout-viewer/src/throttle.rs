use std::time::Duration;

use tokio::time::Instant;

/// Lets at most one call through per interval. Calls inside an open interval
/// are dropped, never queued or replayed later.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the slot at `now`. Returns false while the previous interval is open.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Run `f` if the limiter admits a call now.
    pub fn call<T>(&mut self, f: impl FnOnce() -> T) -> Option<T> {
        self.call_at(Instant::now(), f)
    }

    pub fn call_at<T>(&mut self, now: Instant, f: impl FnOnce() -> T) -> Option<T> {
        if self.try_acquire_at(now) {
            Some(f())
        } else {
            None
        }
    }
}

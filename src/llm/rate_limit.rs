//! Sliding-window request limiter for the hosted API.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub used: usize,
    pub remaining: usize,
    /// Seconds until the oldest request leaves the window; 0 when idle.
    pub reset_seconds: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: VecDeque::new(),
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request at `now` if the window has room. On rejection,
    /// returns the seconds to wait.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), u64> {
        self.evict(now);
        if self.requests.len() >= self.max_requests {
            return Err(self.reset_after(now).max(1));
        }
        self.requests.push_back(now);
        Ok(())
    }

    pub fn status(&mut self, now: Instant) -> RateLimitStatus {
        self.evict(now);
        let used = self.requests.len();
        RateLimitStatus {
            used,
            remaining: self.max_requests.saturating_sub(used),
            reset_seconds: self.reset_after(now),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.requests.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset_after(&self, now: Instant) -> u64 {
        self.requests
            .front()
            .map(|&oldest| {
                let elapsed = now.saturating_duration_since(oldest);
                self.window.saturating_sub(elapsed).as_secs_f64().ceil() as u64
            })
            .unwrap_or(0)
    }
}

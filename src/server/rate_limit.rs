//! Rolling-window rate limiter for write operations.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// At most `max_events` in any rolling `window`. One limiter per process.
pub struct RateLimiter {
    window: Duration,
    max_events: usize,
    events: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            window,
            max_events,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Rate limiter for tool-server write operations: 30 per minute.
    pub fn for_writes() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Record an event if the window has room. Returns false when the
    /// caller should be rejected.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        while let Some(&front) = events.front() {
            if now.duration_since(front) >= self.window {
                events.pop_front();
            } else {
                break;
            }
        }
        if events.len() >= self.max_events {
            return false;
        }
        events.push_back(now);
        true
    }
}

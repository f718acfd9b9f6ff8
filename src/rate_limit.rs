//! Sliding-window request counters.
//!
//! [`RateLimiter`] keys on the client identifier and backs the global auth
//! middleware; [`PathRateLimiter`] keys on `(client, path)` for integrators
//! who want brute-force protection scoped to sensitive routes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempt {
    Ok,
    Exceeded,
}

#[derive(Clone, Copy, Debug)]
struct Counter {
    first_hit: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    counters: Mutex<HashMap<String, Counter>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Count one attempt for `key` against the sliding window.
    ///
    /// While over the limit the window is NOT reset, so a client hammering
    /// the server stays limited instead of sliding back in.
    pub fn try_attempt(&self, key: &str) -> Attempt {
        let now = Instant::now();
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match counters.get_mut(key) {
            None => {
                counters.insert(
                    key.to_string(),
                    Counter {
                        first_hit: now,
                        count: 1,
                    },
                );
                Attempt::Ok
            }
            Some(counter) if now.duration_since(counter.first_hit) > self.window => {
                *counter = Counter {
                    first_hit: now,
                    count: 1,
                };
                Attempt::Ok
            }
            Some(counter) if counter.count >= self.max_attempts => Attempt::Exceeded,
            Some(counter) => {
                counter.count += 1;
                Attempt::Ok
            }
        }
    }

    /// Forget `key` entirely.
    pub fn release(&self, key: &str) {
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }
}

/// Brute-force counter scoped to `(client, path)` rather than the client
/// alone, so one hot route cannot starve the rest of the API.
#[derive(Debug)]
pub struct PathRateLimiter {
    inner: RateLimiter,
}

impl PathRateLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            inner: RateLimiter::new(max_attempts, window),
        }
    }

    pub fn try_attempt(&self, client: &str, path: &str) -> Attempt {
        self.inner.try_attempt(&format!("{client} {path}"))
    }

    pub fn release(&self, client: &str, path: &str) {
        self.inner.release(&format!("{client} {path}"));
    }
}

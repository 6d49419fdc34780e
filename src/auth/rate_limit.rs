use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Sliding-window limiter keyed by an arbitrary string (the login email).
pub struct RateLimiter {
    window: Duration,
    max_attempts: usize,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_attempts: usize) -> Self {
        Self {
            window,
            max_attempts,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        // A panic while holding the lock leaves only timestamps behind; keep going.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `true` if the attempt is allowed and records it.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = Instant::now();
        let key = key.trim().to_ascii_lowercase();
        let mut map = self.entries();
        let timestamps = map.entry(key).or_default();

        timestamps.retain(|&t| now.duration_since(t) < self.window);

        if timestamps.len() >= self.max_attempts {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Drop keys whose attempts have all left the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries().retain(|_, timestamps| {
            timestamps.retain(|&t| now.duration_since(t) < self.window);
            !timestamps.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries().len()
    }
}

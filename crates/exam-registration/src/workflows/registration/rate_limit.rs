use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Sliding-window limiter keyed by caller identity (phone number, user id, ...).
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::minutes(1))
    }

    /// Records a hit at `now` unless the window is already full.
    pub fn allow_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now - *last < self.window)
        });
        let window = hits.entry(key.to_string()).or_default();
        self.evict(window, now);

        if window.len() >= self.max_requests {
            return false;
        }
        window.push_back(now);
        true
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn evict(&self, window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while window
            .front()
            .is_some_and(|first| now - *first >= self.window)
        {
            window.pop_front();
        }
    }
}

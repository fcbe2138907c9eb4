//! Cooldown bookkeeping for recently prompted tasks.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Tracks when each task was last prompted.
///
/// A task is eligible again once its entry is at least `window` old. The
/// hourly sweep only bounds memory; eligibility is re-checked on every
/// selection regardless.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window: Duration,
    last_prompted: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    /// Tracker with the given cooldown window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_prompted: HashMap::new(),
        }
    }

    /// Insert or refresh the entry for `task_id`.
    pub fn record(&mut self, task_id: &str, at: DateTime<Utc>) {
        self.last_prompted.insert(task_id.to_owned(), at);
    }

    /// Whether `task_id` may be selected at `now`.
    #[must_use]
    pub fn is_eligible(&self, task_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_prompted.get(task_id) {
            None => true,
            Some(at) => now - *at >= self.window,
        }
    }

    /// When `task_id` was last prompted, if tracked.
    #[must_use]
    pub fn last_prompted(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.last_prompted.get(task_id).copied()
    }

    /// Evict entries whose window has elapsed. Returns the number removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last_prompted.len();
        let window = self.window;
        self.last_prompted.retain(|_, at| now - *at < window);
        before - self.last_prompted.len()
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_prompted.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_prompted.is_empty()
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.last_prompted.clear();
    }
}

//! Time sources for the prompting engine.
//!
//! The engine never reads the system clock directly: every timestamp comes
//! from an injected [`Clock`], so tests can fast-forward a [`ManualClock`]
//! and production code runs on a [`MonotonicClock`].

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock anchored at construction, advanced by a monotonic instant.
///
/// Built on [`tokio::time::Instant`], so paused tokio time (`start_paused`)
/// drives it in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: tokio::time::Instant,
}

impl MonotonicClock {
    /// Anchor the clock at the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor the clock at an explicit wall-clock time.
    #[must_use]
    pub fn anchored_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        let elapsed = Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero());
        self.anchor_wall + elapsed
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

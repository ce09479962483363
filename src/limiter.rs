//! Rolling-window admission control keyed by caller identity.
//!
//! Each identity gets a window of request timestamps. `admit` prunes entries
//! older than the window, then admits iff fewer than the per-window maximum
//! remain. Pruning is lazy (done on each check), there is no background timer.
//!
//! State is in-memory only and resets on process restart. That is an accepted
//! property of a single-instance deployment, not something this module tries
//! to hide.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check the identity against its window and, if admitted, record the
    /// request. Returns false when the window is full.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Admits still available in the current window. Display-only: never
    /// mutates the recorded timestamps.
    pub fn remaining(&self, identity: &str) -> u32 {
        self.remaining_at(identity, Instant::now())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    pub(crate) fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let entries = windows.entry(identity.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < self.window);

        if entries.len() as u32 >= self.max_per_window {
            debug!("rate limit hit for {identity}: {} in window", entries.len());
            return false;
        }
        entries.push(now);
        true
    }

    pub(crate) fn remaining_at(&self, identity: &str, now: Instant) -> u32 {
        let windows = self.windows.lock();
        let used = windows
            .get(identity)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count() as u32
            })
            .unwrap_or(0);
        self.max_per_window.saturating_sub(used)
    }
}

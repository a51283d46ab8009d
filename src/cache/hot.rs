//! Hot-key detection.
//!
//! Counts hits per key inside a fixed window. A key that reaches the
//! threshold before its window closes stays hot through the next window.
//! It cools once a window passes without it reaching the threshold again,
//! whether or not the key is read in the meantime.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::key::CacheKey;

#[derive(Debug, Clone, Copy)]
struct HitWindow {
    started: Instant,
    hits: u64,
    hot: bool,
}

impl HitWindow {
    /// Whether the window earned the flag and is still open.
    fn earned(&self, now: Instant, window: Duration, threshold: u64) -> bool {
        self.hot
            && self.hits >= threshold
            && now.saturating_duration_since(self.started) < window * 2
    }

    fn is_hot_at(&self, now: Instant, window: Duration, threshold: u64) -> bool {
        let elapsed = now.saturating_duration_since(self.started);
        (self.hot && elapsed < window) || self.earned(now, window, threshold)
    }
}

/// Hit windows for recently read keys.
pub struct HotKeys {
    windows: DashMap<CacheKey, HitWindow>,
    threshold: u64,
    window: Duration,
}

impl HotKeys {
    pub fn new(threshold: u64, window: Duration) -> Self {
        Self {
            windows: DashMap::with_capacity(1_000),
            threshold: threshold.max(1),
            window,
        }
    }

    /// Record a hit. Returns `true` when this hit made the key hot.
    pub fn record_hit(&self, key: &CacheKey, now: Instant) -> bool {
        let mut window = self.windows.entry(key.clone()).or_insert(HitWindow {
            started: now,
            hits: 0,
            hot: false,
        });

        if now.saturating_duration_since(window.started) >= self.window {
            // carried over only from the window right before this one
            let was_hot = window.earned(now, self.window, self.threshold);
            *window = HitWindow {
                started: now,
                hits: 0,
                hot: was_hot,
            };
        }

        window.hits += 1;
        if !window.hot && window.hits >= self.threshold {
            window.hot = true;
            debug!("Key {} is hot ({} hits)", key, window.hits);
            return true;
        }
        false
    }

    pub fn is_hot(&self, key: &CacheKey, now: Instant) -> bool {
        self.windows
            .get(key)
            .is_some_and(|window| window.is_hot_at(now, self.window, self.threshold))
    }

    /// All keys hot at `now`.
    pub fn hot_keys(&self, now: Instant) -> Vec<CacheKey> {
        self.windows
            .iter()
            .filter(|window| window.is_hot_at(now, self.window, self.threshold))
            .map(|window| window.key().clone())
            .collect()
    }

    pub fn hot_count(&self, now: Instant) -> usize {
        self.windows
            .iter()
            .filter(|window| window.is_hot_at(now, self.window, self.threshold))
            .count()
    }

    pub fn forget(&self, key: &CacheKey) {
        self.windows.remove(key);
    }

    /// Drop tracking for keys matching `predicate`.
    pub fn forget_matching(&self, predicate: impl Fn(&CacheKey) -> bool) {
        self.windows.retain(|key, _| !predicate(key));
    }

    /// Drop windows that closed more than one window ago. A key idle that
    /// long can no longer be hot.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let horizon = self.window * 2;
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started) < horizon);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

//! Cache configuration.

use std::collections::HashMap;
use std::time::Duration;

use super::Category;

/// Shortest accepted maintenance interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Tuning knobs for the cache, fixed at startup.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries kept per category.
    pub max_capacity: u64,

    /// Per-category replacements for the default TTL.
    pub ttl_overrides: HashMap<Category, Duration>,

    /// How long the configured-guild set is trusted before it is re-read.
    pub configured_guilds_ttl: Duration,

    /// Upper bound for `wait_for_initial_load`.
    pub load_timeout: Duration,

    /// Interval of the background maintenance pass.
    pub sweep_interval: Duration,

    /// Hits within `hot_key_window` that mark a key as hot.
    pub hot_key_threshold: u64,

    pub hot_key_window: Duration,

    /// Hot keys are refreshed once their remaining lifetime drops below
    /// this fraction of their TTL.
    pub refresh_ahead_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 50_000,
            ttl_overrides: HashMap::new(),
            configured_guilds_ttl: Duration::from_secs(1800), // 30 minutes
            load_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(300), // 5 minutes
            hot_key_threshold: 5,
            hot_key_window: Duration::from_secs(900), // 15 minutes
            refresh_ahead_ratio: 0.2,
        }
    }
}

impl CacheConfig {
    /// Set max entries per category (builder pattern).
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Override the TTL of one category.
    #[must_use]
    pub fn ttl(mut self, category: Category, duration: Duration) -> Self {
        self.ttl_overrides.insert(category, duration);
        self
    }

    #[must_use]
    pub fn configured_guilds_ttl(mut self, duration: Duration) -> Self {
        self.configured_guilds_ttl = duration;
        self
    }

    #[must_use]
    pub fn load_timeout(mut self, duration: Duration) -> Self {
        self.load_timeout = duration;
        self
    }

    /// Set the maintenance interval. Never shorter than [`MIN_SWEEP_INTERVAL`].
    #[must_use]
    pub fn sweep_interval(mut self, duration: Duration) -> Self {
        self.sweep_interval = duration.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Set the hot-key threshold and its window.
    #[must_use]
    pub fn hot_keys(mut self, threshold: u64, window: Duration) -> Self {
        self.hot_key_threshold = threshold;
        self.hot_key_window = window;
        self
    }

    #[must_use]
    pub fn refresh_ahead_ratio(mut self, ratio: f64) -> Self {
        self.refresh_ahead_ratio = ratio.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_interval_is_clamped() {
        let config = CacheConfig::default().sweep_interval(Duration::ZERO);
        assert_eq!(config.sweep_interval, MIN_SWEEP_INTERVAL);

        let config = CacheConfig::default().sweep_interval(Duration::from_millis(50));
        assert_eq!(config.sweep_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_refresh_ahead_ratio_is_clamped() {
        assert_eq!(CacheConfig::default().refresh_ahead_ratio(3.0).refresh_ahead_ratio, 1.0);
        assert_eq!(CacheConfig::default().refresh_ahead_ratio(-1.0).refresh_ahead_ratio, 0.0);
    }
}

//! Cache metrics and health evaluation.
//!
//! Counters are plain atomics bumped on the hot path; [`MetricsSnapshot`]
//! and [`HealthReport`] are the read-only views handed to health checks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use moka::notification::RemovalCause;
use serde::Serialize;

use super::Category;
use super::entry::CacheEntry;

/// Entry count above which the cache is reported as oversized.
const MAX_HEALTHY_ENTRIES: u64 = 10_000;
/// Hit rate (percent) below which the cache is reported as ineffective.
const MIN_HEALTHY_HIT_RATE: f64 = 70.0;
/// Lookups needed before the hit rate is judged at all.
const MIN_REQUESTS_FOR_HIT_RATE: u64 = 100;
/// Evictions per set above which TTLs are reported as too short.
const MAX_EVICTION_RATIO: f64 = 0.5;

#[derive(Debug, Default)]
struct CategoryCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

/// Live counters shared by the store, the facade and the maintenance task.
#[derive(Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    eviction_age_millis: AtomicU64,
    reloads_triggered: AtomicU64,
    reloads_failed: AtomicU64,
    reloads_suppressed: AtomicU64,
    refreshed_ahead: AtomicU64,
    by_category: [CategoryCounters; Category::COUNT],
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            eviction_age_millis: AtomicU64::new(0),
            reloads_triggered: AtomicU64::new(0),
            reloads_failed: AtomicU64::new(0),
            reloads_suppressed: AtomicU64::new(0),
            refreshed_ahead: AtomicU64::new(0),
            by_category: std::array::from_fn(|_| CategoryCounters::default()),
        }
    }
}

impl CacheMetrics {
    pub fn record_hit(&self, category: Category) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.by_category[category.index()]
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, category: Category) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.by_category[category.index()]
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, category: Category) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.by_category[category.index()]
            .sets
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Account for an entry leaving the store. Only expiry and capacity
    /// pressure count as evictions; overwrites and invalidation do not.
    pub fn record_removal(&self, entry: &CacheEntry, cause: RemovalCause) {
        if !matches!(cause, RemovalCause::Expired | RemovalCause::Size) {
            return;
        }

        let age = u64::try_from(entry.age_at(Instant::now()).as_millis()).unwrap_or(u64::MAX);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.eviction_age_millis.fetch_add(age, Ordering::Relaxed);
        if cause == RemovalCause::Expired {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reload_triggered(&self) {
        self.reloads_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload_failed(&self) {
        self.reloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload_suppressed(&self) {
        self.reloads_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refreshed_ahead(&self) {
        self.refreshed_ahead.fetch_add(1, Ordering::Relaxed);
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn reloads_triggered(&self) -> u64 {
        self.reloads_triggered.load(Ordering::Relaxed)
    }

    /// Take a consistent-enough copy of all counters.
    ///
    /// `size_of` reports the current entry count of a category.
    pub fn snapshot(&self, size_of: impl Fn(Category) -> u64, hot_keys: usize) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let hits = load(&self.hits);
        let misses = load(&self.misses);
        let total_requests = hits + misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            (hits as f64 / total_requests as f64 * 10_000.0).round() / 100.0
        };

        let evictions = load(&self.evictions);
        let avg_age_at_eviction_secs = if evictions == 0 {
            0.0
        } else {
            load(&self.eviction_age_millis) as f64 / evictions as f64 / 1000.0
        };

        let mut total_entries = 0;
        let by_category = Category::ALL
            .iter()
            .map(|&category| {
                let counters = &self.by_category[category.index()];
                let size = size_of(category);
                total_entries += size;
                (
                    category.name(),
                    CategorySnapshot {
                        hits: load(&counters.hits),
                        misses: load(&counters.misses),
                        sets: load(&counters.sets),
                        size,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            hits,
            misses,
            sets: load(&self.sets),
            evictions,
            expirations: load(&self.expirations),
            hit_rate,
            total_requests,
            total_entries,
            reloads_triggered: load(&self.reloads_triggered),
            reloads_failed: load(&self.reloads_failed),
            reloads_suppressed: load(&self.reloads_suppressed),
            refreshed_ahead: load(&self.refreshed_ahead),
            avg_age_at_eviction_secs,
            hot_keys,
            by_category,
        }
    }
}

/// Per-category counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorySnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub size: u64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Percentage, two decimals.
    pub hit_rate: f64,
    pub total_requests: u64,
    pub total_entries: u64,
    pub reloads_triggered: u64,
    pub reloads_failed: u64,
    pub reloads_suppressed: u64,
    pub refreshed_ahead: u64,
    pub avg_age_at_eviction_secs: f64,
    pub hot_keys: usize,
    pub by_category: BTreeMap<&'static str, CategorySnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Result of a cache health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub metrics: MetricsSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn evaluate(metrics: MetricsSnapshot) -> Self {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if metrics.total_entries > MAX_HEALTHY_ENTRIES {
            issues.push(format!(
                "Cache size very large: {} entries",
                metrics.total_entries
            ));
            recommendations.push("Reduce TTL values or sweep more often".to_owned());
        }

        if metrics.total_requests > MIN_REQUESTS_FOR_HIT_RATE
            && metrics.hit_rate < MIN_HEALTHY_HIT_RATE
        {
            issues.push(format!("Low cache hit rate: {:.1}%", metrics.hit_rate));
            recommendations.push("Review caching strategy and TTL configuration".to_owned());
        }

        if metrics.evictions as f64 > metrics.sets as f64 * MAX_EVICTION_RATIO {
            issues.push("High eviction rate indicates TTL values may be too low".to_owned());
            recommendations.push("Increase TTL for frequently accessed data".to_owned());
        }

        let status = match issues.len() {
            0 => HealthStatus::Healthy,
            1 | 2 => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        };

        Self {
            status,
            issues,
            recommendations,
            metrics,
            generated_at: Utc::now(),
        }
    }
}

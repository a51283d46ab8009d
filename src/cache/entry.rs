//! A single cached value with its lifetime and access bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;

/// Cached payload. Shared so readers never copy large documents.
pub type CacheValue = Arc<Value>;

/// Longest lifetime an entry may be given.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// One cached value.
///
/// Entries are replaced wholesale on write; only the access counters change
/// in place.
#[derive(Debug)]
pub struct CacheEntry {
    value: CacheValue,
    created_at: Instant,
    expires_at: Instant,
    ttl: Duration,
    access_count: AtomicU64,
    /// Microseconds between `created_at` and the last access.
    last_access_micros: AtomicU64,
}

impl CacheEntry {
    pub fn new(value: CacheValue, ttl: Duration) -> Self {
        Self::created_at(value, ttl, Instant::now())
    }

    pub fn created_at(value: CacheValue, ttl: Duration, now: Instant) -> Self {
        let ttl = ttl.min(MAX_TTL);
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            ttl,
            access_count: AtomicU64::new(0),
            last_access_micros: AtomicU64::new(0),
        }
    }

    pub fn value(&self) -> &CacheValue {
        &self.value
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Record a read.
    pub fn touch(&self, now: Instant) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        let offset = u64::try_from(self.age_at(now).as_micros()).unwrap_or(u64::MAX);
        self.last_access_micros.fetch_max(offset, Ordering::Relaxed);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn last_access_at(&self) -> Instant {
        self.created_at + Duration::from_micros(self.last_access_micros.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_boundary() {
        let now = Instant::now();
        let entry = CacheEntry::created_at(Arc::new(json!(1)), Duration::from_secs(10), now);

        assert!(!entry.is_expired_at(now + Duration::from_secs(9)));
        assert!(entry.is_expired_at(now + Duration::from_secs(10)));
        assert_eq!(entry.remaining_at(now + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(entry.remaining_at(now + Duration::from_secs(40)), Duration::ZERO);
    }

    #[test]
    fn test_touch_tracks_accesses() {
        let now = Instant::now();
        let entry = CacheEntry::created_at(Arc::new(json!("x")), Duration::from_secs(60), now);
        assert_eq!(entry.access_count(), 0);

        entry.touch(now + Duration::from_secs(2));
        entry.touch(now + Duration::from_secs(5));

        assert_eq!(entry.access_count(), 2);
        assert_eq!(entry.last_access_at(), now + Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_is_capped() {
        let entry = CacheEntry::new(Arc::new(json!(null)), Duration::MAX);
        assert_eq!(entry.ttl(), MAX_TTL);
    }
}

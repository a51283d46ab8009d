//! Entry store - one bounded moka cache per category.
//!
//! Expiry is per entry: moka asks [`EntryExpiry`] for each entry's own TTL, so
//! per-write overrides are honoured. Reads re-check `expires_at` themselves
//! and drop anything past it, which keeps the "never served stale" guarantee
//! independent of moka's housekeeping schedule.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use tracing::debug;

use super::entry::{CacheEntry, CacheValue};
use super::key::CacheKey;
use super::metrics::CacheMetrics;
use super::Category;

type Shard = Cache<CacheKey, Arc<CacheEntry>>;

/// Hands every entry's own TTL to moka.
struct EntryExpiry;

impl Expiry<CacheKey, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        entry: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        entry: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl())
    }
}

/// Mapping from [`CacheKey`] to [`CacheEntry`].
///
/// Never fails: capacity pressure and expiry only ever turn into misses.
pub struct EntryStore {
    shards: Vec<Shard>,
    metrics: Arc<CacheMetrics>,
}

impl EntryStore {
    pub fn new(max_capacity: u64, metrics: Arc<CacheMetrics>) -> Self {
        let shards = Category::ALL
            .iter()
            .map(|&category| {
                let listener_metrics = Arc::clone(&metrics);
                Cache::builder()
                    .name(category.name())
                    .max_capacity(max_capacity)
                    .expire_after(EntryExpiry)
                    .eviction_listener(move |_key, entry: Arc<CacheEntry>, cause| {
                        listener_metrics.record_removal(&entry, cause);
                    })
                    .build()
            })
            .collect();

        Self { shards, metrics }
    }

    fn shard(&self, category: Category) -> &Shard {
        &self.shards[category.index()]
    }

    /// Look up a live entry, counting the hit or miss.
    ///
    /// An entry observed past its expiry is removed on the spot.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let now = Instant::now();
        let category = key.category();
        let shard = self.shard(category);

        match shard.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.touch(now);
                self.metrics.record_hit(category);
                Some(entry)
            }
            Some(_) => {
                // moka reports this removal as explicit
                if let Some(entry) = shard.remove(key) {
                    self.metrics.record_removal(&entry, RemovalCause::Expired);
                }
                self.metrics.record_miss(category);
                None
            }
            None => {
                self.metrics.record_miss(category);
                None
            }
        }
    }

    /// Look up a live entry without touching counters.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let now = Instant::now();
        self.shard(key.category())
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
    }

    /// Insert or replace an entry in one step.
    pub fn insert(&self, key: CacheKey, value: CacheValue, ttl: Duration) {
        let category = key.category();
        self.metrics.record_set(category);
        self.shard(category)
            .insert(key, Arc::new(CacheEntry::new(value, ttl)));
    }

    /// Remove one entry. Returns whether a live entry was removed.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.shard(key.category()).remove(key).is_some()
    }

    /// Remove entries of `category` (optionally only those with `scope`)
    /// for which `keep` returns false. Returns the number removed.
    pub fn retain_scope(
        &self,
        category: Category,
        scope: Option<u64>,
        keep: impl Fn(&CacheKey) -> bool,
    ) -> usize {
        let shard = self.shard(category);
        let doomed: Vec<Arc<CacheKey>> = shard
            .iter()
            .filter(|(key, _)| scope.is_none_or(|scope| key.scope() == Some(scope)))
            .filter(|(key, _)| !keep(key.as_ref()))
            .map(|(key, _)| key)
            .collect();

        doomed
            .iter()
            .filter(|key| shard.remove(key.as_ref()).is_some())
            .count()
    }

    /// Remove every entry of `category`, or only those of one scope.
    pub fn delete_by_prefix(&self, category: Category, scope: Option<u64>) -> usize {
        let removed = self.retain_scope(category, scope, |_| false);
        debug!(
            "Removed {} entries from {} (scope {:?})",
            removed, category, scope
        );
        removed
    }

    /// Evict expired entries nobody has read. Returns how many expired.
    pub fn sweep(&self) -> u64 {
        let before = self.metrics.expirations();
        for shard in &self.shards {
            shard.run_pending_tasks();
        }
        self.metrics.expirations().saturating_sub(before)
    }

    /// Approximate number of entries in one category.
    pub fn len(&self, category: Category) -> u64 {
        self.shard(category).entry_count()
    }

    pub fn total_len(&self) -> u64 {
        self.shards.iter().map(Shard::entry_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("entry_count", &self.total_len())
            .finish()
    }
}

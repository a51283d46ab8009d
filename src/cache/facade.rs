//! Global cache facade.
//!
//! The read/write/invalidate surface used by feature modules. Every key is
//! built through [`CacheKey`], whether it comes from a single write, a bulk
//! load or a reload on miss.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::entry::CacheValue;
use super::error::CacheError;
use super::guard::ConfiguredGuilds;
use super::hot::HotKeys;
use super::key::{CacheKey, GuildId, KeyParts};
use super::loader::LoaderState;
use super::metrics::{CacheMetrics, HealthReport, MetricsSnapshot};
use super::registry::CategoryRegistry;
use super::store::EntryStore;
use super::{CacheConfig, Category};
use crate::database::{Query, QueryBackend};

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub expired: u64,
    pub refreshed: usize,
    pub pruned: usize,
}

pub struct GlobalCache<B> {
    registry: CategoryRegistry,
    store: EntryStore,
    metrics: Arc<CacheMetrics>,
    hot: HotKeys,
    guard: ConfiguredGuilds<B>,
    backend: Arc<B>,
    state: Arc<LoaderState>,
    refresh_ahead_ratio: f64,
}

impl<B: QueryBackend> GlobalCache<B> {
    pub fn new(backend: Arc<B>, config: &CacheConfig, state: Arc<LoaderState>) -> Self {
        let metrics = Arc::new(CacheMetrics::default());
        Self {
            registry: CategoryRegistry::new(config),
            store: EntryStore::new(config.max_capacity, Arc::clone(&metrics)),
            metrics,
            hot: HotKeys::new(config.hot_key_threshold, config.hot_key_window),
            guard: ConfiguredGuilds::new(Arc::clone(&backend), config.configured_guilds_ttl),
            backend,
            state,
            refresh_ahead_ratio: config.refresh_ahead_ratio,
        }
    }

    /// Read one guild entry.
    ///
    /// After the initial load, a miss for a configured guild reloads that
    /// guild's rows of `category` before answering. Unconfigured guilds get
    /// `None` without a query.
    pub async fn get_guild_data(
        &self,
        guild_id: GuildId,
        category: Category,
        subkey: Option<&str>,
    ) -> Result<Option<CacheValue>, CacheError> {
        let key = CacheKey::guild(category, guild_id, subkey)?;
        if let Some(value) = self.lookup(&key) {
            return Ok(Some(value));
        }

        if !self.state.is_complete() {
            return Ok(None);
        }

        let configured = self
            .guard
            .is_guild_configured(guild_id)
            .await
            .map_err(|source| {
                self.metrics.record_reload_failed();
                CacheError::ReloadFailure {
                    category,
                    guild_id,
                    source,
                }
            })?;

        if !configured {
            self.metrics.record_reload_suppressed();
            debug!("Skipping reload of {} for unconfigured guild {}", category, guild_id);
            return Ok(None);
        }

        self.reload_guild_category(guild_id, category).await?;
        Ok(self.store.peek(&key).map(|entry| Arc::clone(entry.value())))
    }

    /// Write one guild entry. The cache is not write-back; persisting is the
    /// caller's job.
    pub fn set_guild_data(
        &self,
        guild_id: GuildId,
        category: Category,
        value: impl Into<CacheValue>,
        subkey: Option<&str>,
    ) -> Result<(), CacheError> {
        let key = CacheKey::guild(category, guild_id, subkey)?;
        self.set(key, value);
        Ok(())
    }

    pub fn delete_guild_data(
        &self,
        guild_id: GuildId,
        category: Category,
        subkey: Option<&str>,
    ) -> Result<bool, CacheError> {
        let key = CacheKey::guild(category, guild_id, subkey)?;
        Ok(self.delete(&key))
    }

    /// Fetch one guild's rows of `category` and replace its cached entries.
    pub async fn reload_guild_category(
        &self,
        guild_id: GuildId,
        category: Category,
    ) -> Result<usize, CacheError> {
        self.metrics.record_reload_triggered();
        info!("Reloading {} for guild {}", category, guild_id);

        self.repopulate_guild(guild_id, category).await.inspect_err(|e| {
            self.metrics.record_reload_failed();
            warn!("Reload of {} for guild {} failed: {}", category, guild_id, e);
        })
    }

    async fn repopulate_guild(&self, guild_id: GuildId, category: Category) -> Result<usize, CacheError> {
        let rows = self
            .backend
            .fetch(Query::CategoryForGuild(category, guild_id))
            .await
            .map_err(|source| CacheError::ReloadFailure {
                category,
                guild_id,
                source,
            })?;

        let entries = self.registry.descriptor(category).arrange(rows);
        self.replace_scope(category, Some(guild_id.get()), entries)
    }

    /// Read a game-scoped or global entry. Never reloads.
    pub fn get_static_data(
        &self,
        category: Category,
        scope: Option<u64>,
    ) -> Result<Option<CacheValue>, CacheError> {
        let key = CacheKey::new(category, KeyParts { scope, subkey: None })?;
        Ok(self.lookup(&key))
    }

    pub fn set_static_data(
        &self,
        category: Category,
        scope: Option<u64>,
        value: impl Into<CacheValue>,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(category, KeyParts { scope, subkey: None })?;
        self.set(key, value);
        Ok(())
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.lookup(key)
    }

    /// Write with the category's TTL.
    pub fn set(&self, key: CacheKey, value: impl Into<CacheValue>) {
        let ttl = self.registry.ttl(key.category());
        self.store.insert(key, value.into(), ttl);
    }

    pub fn set_with_ttl(&self, key: CacheKey, value: impl Into<CacheValue>, ttl: Duration) {
        self.store.insert(key, value.into(), ttl);
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        self.hot.forget(key);
        self.store.remove(key)
    }

    fn lookup(&self, key: &CacheKey) -> Option<CacheValue> {
        let entry = self.store.get(key)?;
        self.hot.record_hit(key, Instant::now());
        Some(Arc::clone(entry.value()))
    }

    /// Write many entries of one category with its TTL.
    ///
    /// Every key is checked before anything is written.
    pub fn bulk_set(
        &self,
        category: Category,
        entries: Vec<(KeyParts, Value)>,
    ) -> Result<usize, CacheError> {
        let keyed = entries
            .into_iter()
            .map(|(parts, value)| Ok((CacheKey::new(category, parts)?, value)))
            .collect::<Result<Vec<_>, CacheError>>()?;

        let ttl = self.registry.ttl(category);
        let count = keyed.len();
        for (key, value) in keyed {
            self.store.insert(key, Arc::new(value), ttl);
        }
        Ok(count)
    }

    /// Write `entries`, then drop the entries of `category` (within `scope`,
    /// if given) that were not among them.
    pub(crate) fn replace_scope(
        &self,
        category: Category,
        scope: Option<u64>,
        entries: Vec<(KeyParts, Value)>,
    ) -> Result<usize, CacheError> {
        let fresh = entries
            .iter()
            .map(|(parts, _)| CacheKey::new(category, parts.clone()))
            .collect::<Result<HashSet<_>, _>>()?;

        let count = self.bulk_set(category, entries)?;
        let stale = self
            .store
            .retain_scope(category, scope, |key| fresh.contains(key));
        if stale > 0 {
            debug!("Dropped {} stale {} entries (scope {:?})", stale, category, scope);
        }
        Ok(count)
    }

    /// Drop every entry of a category.
    pub fn invalidate_category(&self, category: Category) -> usize {
        let removed = self.store.delete_by_prefix(category, None);
        self.hot.forget_matching(|key| key.category() == category);
        info!("Invalidated {} entries of {}", removed, category);
        removed
    }

    /// Drop every entry scoped to one guild, across all guild categories.
    pub fn invalidate_guild(&self, guild_id: GuildId) -> usize {
        let removed: usize = self
            .registry
            .guild_categories()
            .map(|category| self.store.delete_by_prefix(category, Some(guild_id.get())))
            .sum();
        self.hot.forget_matching(|key| key.guild_id() == Some(guild_id));
        info!("Invalidated {} entries for guild {}", removed, guild_id);
        removed
    }

    pub fn invalidate_configured_guilds_cache(&self) {
        self.guard.invalidate();
    }

    /// Drop the categories derived from `category`, optionally for one guild.
    pub fn invalidate_related(&self, category: Category, guild_id: Option<GuildId>) -> usize {
        let dependents = self.registry.descriptor(category).dependents;
        let removed: usize = dependents
            .iter()
            .map(|&dependent| match guild_id {
                Some(guild_id) => self.store.delete_by_prefix(dependent, Some(guild_id.get())),
                None => self.store.delete_by_prefix(dependent, None),
            })
            .sum();

        self.hot.forget_matching(|key| {
            dependents.contains(&key.category())
                && guild_id.is_none_or(|guild_id| key.guild_id() == Some(guild_id))
        });
        debug!(
            "Invalidated {} entries related to {} (guild {:?})",
            removed, category, guild_id
        );
        removed
    }

    /// Evict expired entries nobody has read.
    pub fn sweep(&self) -> u64 {
        let expired = self.store.sweep();
        if expired > 0 {
            debug!("Sweep evicted {} expired entries", expired);
        }
        expired
    }

    /// Reload the guild categories of hot keys close to expiry.
    ///
    /// Keys are grouped so each guild/category pair is fetched once.
    pub async fn refresh_hot_keys(&self) -> usize {
        if !self.state.is_complete() {
            return 0;
        }

        let now = Instant::now();
        let due: BTreeSet<(Category, GuildId)> = self
            .hot
            .hot_keys(now)
            .into_iter()
            .filter_map(|key| {
                let guild_id = key.guild_id()?;
                let entry = self.store.peek(&key)?;
                let threshold = entry.ttl().mul_f64(self.refresh_ahead_ratio);
                (entry.remaining_at(now) <= threshold).then_some((key.category(), guild_id))
            })
            .collect();

        let mut refreshed = 0;
        for (category, guild_id) in due {
            match self.repopulate_guild(guild_id, category).await {
                Ok(_) => {
                    self.metrics.record_refreshed_ahead();
                    refreshed += 1;
                }
                Err(e) => warn!("Refresh-ahead of {} for guild {} failed: {}", category, guild_id, e),
            }
        }

        if refreshed > 0 {
            info!("Refreshed {} hot guild categories ahead of expiry", refreshed);
        }
        refreshed
    }

    /// One maintenance pass: sweep, refresh hot keys, prune hit windows.
    pub async fn run_maintenance(&self) -> MaintenanceSummary {
        let expired = self.sweep();
        let refreshed = self.refresh_hot_keys().await;
        let now = Instant::now();
        let pruned = self.hot.prune(now);

        let summary = MaintenanceSummary {
            expired,
            refreshed,
            pruned,
        };
        debug!(
            "Cache maintenance: {:?}, {} entries, {} hot keys",
            summary,
            self.store.total_len(),
            self.hot.hot_count(now)
        );
        summary
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(|category| self.store.len(category), self.hot.hot_count(Instant::now()))
    }

    pub fn health_check(&self) -> HealthReport {
        HealthReport::evaluate(self.metrics())
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &ConfiguredGuilds<B> {
        &self.guard
    }

    pub fn hot_keys(&self) -> &HotKeys {
        &self.hot
    }

    pub fn entry_count(&self) -> u64 {
        self.store.total_len()
    }
}

impl<B> std::fmt::Debug for GlobalCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalCache")
            .field("store", &self.store)
            .field("loaded", &self.state.is_complete())
            .finish_non_exhaustive()
    }
}

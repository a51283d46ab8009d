//! Cache loader - one-shot parallel preload and the readiness signal.
//!
//! `load_all_shared_data` runs under an async mutex. The first caller fetches
//! every preload category concurrently and flips the completion flag; every
//! later caller gets the same [`LoadReport`] back without touching the
//! database.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::error::CacheError;
use super::facade::GlobalCache;
use super::Category;
use crate::database::{Query, QueryBackend};

/// Outcome of the initial load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Entries written per category.
    pub loaded: BTreeMap<Category, usize>,
    /// Error message per category that could not be fetched.
    pub failed: BTreeMap<Category, String>,
}

impl LoadReport {
    /// Whether any category failed to load.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn total_entries(&self) -> usize {
        self.loaded.values().sum()
    }
}

/// Load progress shared by the loader and the facade.
///
/// `complete` goes from false to true once and never back.
#[derive(Debug)]
pub struct LoaderState {
    complete: AtomicBool,
    load_lock: tokio::sync::Mutex<()>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    loaded: RwLock<HashSet<Category>>,
    report: RwLock<Option<Arc<LoadReport>>>,
    ready: watch::Sender<bool>,
}

impl Default for LoaderState {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            complete: AtomicBool::new(false),
            load_lock: tokio::sync::Mutex::new(()),
            started_at: Mutex::new(None),
            loaded: RwLock::new(HashSet::new()),
            report: RwLock::new(None),
            ready,
        }
    }
}

impl LoaderState {
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock()
    }

    pub fn is_category_loaded(&self, category: Category) -> bool {
        self.loaded.read().contains(&category)
    }

    pub fn loaded_categories(&self) -> Vec<Category> {
        let mut categories: Vec<_> = self.loaded.read().iter().copied().collect();
        categories.sort();
        categories
    }

    pub fn report(&self) -> Option<Arc<LoadReport>> {
        self.report.read().clone()
    }

    fn mark_category_loaded(&self, category: Category) {
        self.loaded.write().insert(category);
    }

    fn finish(&self, report: Arc<LoadReport>) {
        *self.report.write() = Some(report);
        self.complete.store(true, Ordering::Release);
        self.ready.send_replace(true);
    }
}

/// Populates the cache from the backend and reports readiness.
pub struct CacheLoader<B> {
    cache: Arc<GlobalCache<B>>,
    backend: Arc<B>,
    state: Arc<LoaderState>,
    load_timeout: Duration,
}

impl<B: QueryBackend> CacheLoader<B> {
    pub fn new(
        cache: Arc<GlobalCache<B>>,
        backend: Arc<B>,
        state: Arc<LoaderState>,
        load_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            backend,
            state,
            load_timeout,
        }
    }

    /// Load every preload category once for the life of the process.
    ///
    /// Failed categories are recorded in the report and do not stop the
    /// others; the loader reaches the loaded state either way.
    pub async fn load_all_shared_data(&self) -> Arc<LoadReport> {
        let _lock = self.state.load_lock.lock().await;

        if self.state.is_complete() {
            if let Some(report) = self.state.report() {
                debug!("Initial cache load already complete, skipping");
                return report;
            }
        }

        let started_at = Utc::now();
        *self.state.started_at.lock() = Some(started_at);
        let timer = Instant::now();

        let categories: Vec<Category> = self.cache.registry().preload_categories().collect();
        info!("Starting initial cache load for {} categories", categories.len());

        let results = join_all(
            categories
                .iter()
                .map(|&category| async move { (category, self.load_category(category).await) }),
        )
        .await;

        let mut loaded = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (category, result) in results {
            match result {
                Ok(count) => {
                    loaded.insert(category, count);
                }
                Err(e) => {
                    error!("Failed to load {}: {}", category, error_chain(&e));
                    failed.insert(category, error_chain(&e));
                }
            }
        }

        let report = Arc::new(LoadReport {
            started_at,
            duration_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
            loaded,
            failed,
        });

        if report.is_partial() {
            warn!(
                "Initial cache load finished with {} failed categories in {}ms",
                report.failed.len(),
                report.duration_ms
            );
        } else {
            info!(
                "Initial cache load complete: {} categories, {} entries in {}ms",
                report.loaded.len(),
                report.total_entries(),
                report.duration_ms
            );
        }

        self.state.finish(Arc::clone(&report));
        report
    }

    /// Wait for the initial load using the configured timeout.
    pub async fn wait_for_initial_load(&self) -> Result<(), CacheError> {
        self.wait_for_initial_load_within(self.load_timeout).await
    }

    /// Wait for the initial load for at most `timeout`.
    ///
    /// Timing out only releases this caller; the load keeps running.
    pub async fn wait_for_initial_load_within(&self, timeout: Duration) -> Result<(), CacheError> {
        if self.state.is_complete() {
            return Ok(());
        }

        let mut ready = self.state.ready.subscribe();
        let outcome = tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
            .await
            .map(|changed| changed.is_ok());

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => {
                warn!("Timed out after {:?} waiting for initial cache load", timeout);
                Err(CacheError::LoadTimeout(timeout))
            }
        }
    }

    /// Load one category unless it is already loaded.
    ///
    /// Meant for categories left out of the preload batch.
    pub async fn ensure_category_loaded(&self, category: Category) -> Result<(), CacheError> {
        if self.state.is_category_loaded(category) {
            return Ok(());
        }

        let count = self.load_category(category).await?;
        info!("Loaded {} on demand ({} entries)", category, count);
        Ok(())
    }

    /// Refetch a whole category and replace its entries.
    pub async fn reload_category(&self, category: Category) -> Result<usize, CacheError> {
        let rows = self
            .backend
            .fetch(Query::Category(category))
            .await
            .map_err(|source| CacheError::CategoryLoad { category, source })?;

        let entries = category.descriptor().arrange(rows);
        let count = self.cache.replace_scope(category, None, entries)?;
        self.state.mark_category_loaded(category);
        info!("Reloaded {} ({} entries)", category, count);
        Ok(count)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_complete()
    }

    pub fn is_category_loaded(&self, category: Category) -> bool {
        self.state.is_category_loaded(category)
    }

    pub fn loaded_categories(&self) -> Vec<Category> {
        self.state.loaded_categories()
    }

    pub fn last_report(&self) -> Option<Arc<LoadReport>> {
        self.state.report()
    }

    pub fn state(&self) -> &Arc<LoaderState> {
        &self.state
    }

    async fn load_category(&self, category: Category) -> Result<usize, CacheError> {
        let rows = self
            .backend
            .fetch(Query::Category(category))
            .await
            .map_err(|source| CacheError::CategoryLoad { category, source })?;

        let count = self
            .cache
            .bulk_set(category, category.descriptor().arrange(rows))?;
        self.state.mark_category_loaded(category);
        debug!("Loaded {} ({} entries)", category, count);
        Ok(count)
    }
}

/// Render an error with its sources, outermost first.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::BackendError;

    #[test]
    fn test_state_completes_once() {
        let state = LoaderState::default();
        assert!(!state.is_complete());
        assert!(state.report().is_none());

        let report = Arc::new(LoadReport {
            started_at: Utc::now(),
            duration_ms: 3,
            loaded: BTreeMap::from([(Category::Weapons, 2)]),
            failed: BTreeMap::new(),
        });
        state.finish(Arc::clone(&report));

        assert!(state.is_complete());
        assert!(*state.ready.borrow());
        assert!(!state.report().unwrap().is_partial());
    }

    #[test]
    fn test_report_serializes_category_names() {
        let report = LoadReport {
            started_at: Utc::now(),
            duration_ms: 12,
            loaded: BTreeMap::from([(Category::GuildPtbSettings, 4)]),
            failed: BTreeMap::from([(Category::LootWishlist, "down".to_owned())]),
        };
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["loaded"]["guild_ptb_settings"], 4);
        assert_eq!(json["failed"]["loot_wishlist"], "down");
        assert!(report.is_partial());
        assert_eq!(report.total_entries(), 4);
    }

    #[test]
    fn test_error_chain_includes_source() {
        let error = CacheError::CategoryLoad {
            category: Category::Weapons,
            source: BackendError::Unavailable("connection reset".to_owned()),
        };
        assert_eq!(
            error_chain(&error),
            "loading weapons failed: backend unavailable: connection reset"
        );
    }
}

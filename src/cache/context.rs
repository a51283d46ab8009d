//! Cache context - the explicitly constructed bundle handed to consumers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::facade::GlobalCache;
use super::loader::{CacheLoader, LoaderState};
use super::config::MIN_SWEEP_INTERVAL;
use super::CacheConfig;
use crate::database::QueryBackend;

/// Facade and loader sharing one store, one guard and one load state.
///
/// Each context is fully isolated; tests build one per case.
pub struct CacheContext<B> {
    pub cache: Arc<GlobalCache<B>>,
    pub loader: Arc<CacheLoader<B>>,
    sweep_interval: Duration,
}

impl<B: QueryBackend> CacheContext<B> {
    pub fn new(backend: Arc<B>, config: CacheConfig) -> Self {
        let state = Arc::new(LoaderState::default());
        let cache = Arc::new(GlobalCache::new(
            Arc::clone(&backend),
            &config,
            Arc::clone(&state),
        ));
        let loader = Arc::new(CacheLoader::new(
            Arc::clone(&cache),
            backend,
            state,
            config.load_timeout,
        ));

        Self {
            cache,
            loader,
            sweep_interval: config.sweep_interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Run [`GlobalCache::run_maintenance`] every sweep interval until the
    /// returned handle is aborted.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let period = self.sweep_interval;
        info!("Cache maintenance every {:?}", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                cache.run_maintenance().await;
            }
        })
    }
}

impl<B> Clone for CacheContext<B> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            loader: Arc::clone(&self.loader),
            sweep_interval: self.sweep_interval,
        }
    }
}

//! Configured-guild guard.
//!
//! A TTL-bounded copy of the set of guilds that finished setup. The facade
//! asks it before reloading a guild on a miss, so guilds that never ran
//! setup cannot trigger database traffic. It only ever suppresses reloads;
//! writes never consult it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, info, warn};

use super::key::GuildId;
use crate::database::{BackendError, Query, QueryBackend, row_id};

pub struct ConfiguredGuilds<B> {
    backend: Arc<B>,
    guilds: Cache<(), Arc<HashSet<GuildId>>>,
    ttl: Duration,
}

impl<B: QueryBackend> ConfiguredGuilds<B> {
    pub fn new(backend: Arc<B>, ttl: Duration) -> Self {
        Self {
            backend,
            guilds: Cache::builder().name("configured_guilds").time_to_live(ttl).build(),
            ttl,
        }
    }

    /// Whether `guild_id` has completed setup.
    ///
    /// Answers from the cached set while it is fresh; otherwise re-reads the
    /// whole set first.
    pub async fn is_guild_configured(&self, guild_id: GuildId) -> Result<bool, BackendError> {
        let guilds = match self.guilds.get(&()) {
            Some(guilds) => guilds,
            None => self.refresh().await?,
        };
        Ok(guilds.contains(&guild_id))
    }

    /// Re-read the configured set from the backend and cache it.
    pub async fn refresh(&self) -> Result<Arc<HashSet<GuildId>>, BackendError> {
        let rows = self.backend.fetch(Query::ConfiguredGuilds).await?;

        let mut guilds = HashSet::with_capacity(rows.len());
        for row in &rows {
            match row.get("guild_id").and_then(row_id) {
                Some(id) => {
                    guilds.insert(GuildId::new(id));
                }
                None => warn!("Ignoring configured guild row without a usable guild_id"),
            }
        }

        let guilds = Arc::new(guilds);
        self.guilds.insert((), Arc::clone(&guilds));
        info!("Configured guilds refreshed: {} guilds", guilds.len());
        Ok(guilds)
    }

    /// Forget the cached set; the next check re-reads it.
    ///
    /// Called when a guild finishes setup or is reset.
    pub fn invalidate(&self) {
        self.guilds.invalidate(&());
        debug!("Configured guilds cache invalidated");
    }

    /// The cached set, if fresh.
    pub fn cached(&self) -> Option<Arc<HashSet<GuildId>>> {
        self.guilds.get(&())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

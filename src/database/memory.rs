//! In-memory query backend for tests and dry runs.
//!
//! Tables are seeded per category. Every query is logged before it is
//! answered so callers can assert on exact database traffic.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::warn;

use super::{BackendError, Query, QueryBackend, Row, row_id};
use crate::cache::{Category, GuildId};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Category, Vec<Row>>>,
    failing: RwLock<HashSet<Category>>,
    configured_guilds_failing: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
    log: Mutex<Vec<Query>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a slow database.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Append one row to a category's table. Non-object values are ignored.
    pub fn insert(&self, category: Category, value: Value) {
        match value {
            Value::Object(row) => self.tables.write().entry(category).or_default().push(row),
            other => warn!("Ignoring non-object row for {}: {}", category, other),
        }
    }

    pub fn insert_many(&self, category: Category, values: impl IntoIterator<Item = Value>) {
        for value in values {
            self.insert(category, value);
        }
    }

    /// Replace every row of a category.
    pub fn replace(&self, category: Category, values: impl IntoIterator<Item = Value>) {
        self.tables.write().remove(&category);
        self.insert_many(category, values);
    }

    /// Make every query for `category` fail until [`MemoryBackend::recover`].
    pub fn fail(&self, category: Category) {
        self.failing.write().insert(category);
    }

    pub fn recover(&self, category: Category) {
        self.failing.write().remove(&category);
    }

    pub fn fail_configured_guilds(&self, failing: bool) {
        *self.configured_guilds_failing.write() = failing;
    }

    /// Every query answered so far, oldest first.
    pub fn queries(&self) -> Vec<Query> {
        self.log.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Queries of any shape that read `category`.
    pub fn count_for(&self, category: Category) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|query| query.category() == Some(category))
            .count()
    }

    /// Single-guild queries for `category` and `guild_id`.
    pub fn count_for_guild(&self, category: Category, guild_id: GuildId) -> usize {
        let wanted = Query::CategoryForGuild(category, guild_id);
        self.log.lock().iter().filter(|query| **query == wanted).count()
    }

    pub fn count_configured_guilds(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|query| **query == Query::ConfiguredGuilds)
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn answer(&self, query: Query) -> Result<Vec<Row>, BackendError> {
        let tables = self.tables.read();
        let rows = |category: Category| tables.get(&category).map(Vec::as_slice).unwrap_or_default();

        match query {
            Query::Category(category) => {
                if self.failing.read().contains(&category) {
                    return Err(BackendError::Unavailable(format!("{category} is failing")));
                }
                Ok(rows(category).to_vec())
            }
            Query::CategoryForGuild(category, guild_id) => {
                if self.failing.read().contains(&category) {
                    return Err(BackendError::Unavailable(format!("{category} is failing")));
                }
                Ok(rows(category)
                    .iter()
                    .filter(|row| row.get("guild_id").and_then(row_id) == Some(guild_id.get()))
                    .cloned()
                    .collect())
            }
            Query::ConfiguredGuilds => {
                if *self.configured_guilds_failing.read() {
                    return Err(BackendError::Unavailable("guild_settings is failing".to_owned()));
                }
                Ok(rows(Category::GuildSettings)
                    .iter()
                    .filter(|row| row.get("initialized").and_then(Value::as_bool) == Some(true))
                    .filter_map(|row| row.get("guild_id"))
                    .map(|guild_id| {
                        let mut row = Row::new();
                        row.insert("guild_id".to_owned(), guild_id.clone());
                        row
                    })
                    .collect())
            }
        }
    }
}

impl QueryBackend for MemoryBackend {
    async fn fetch(&self, query: Query) -> Result<Vec<Row>, BackendError> {
        self.log.lock().push(query);

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.answer(query)
    }
}

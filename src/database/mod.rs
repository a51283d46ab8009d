//! Query backends.
//!
//! The cache reads the database only through [`QueryBackend`] and a closed
//! set of [`Query`] templates, so every query the process can issue is
//! known up front.

mod memory;
mod mongo;

use std::fmt;
use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::cache::{Category, GuildId};

pub use memory::MemoryBackend;
pub use mongo::Database;

/// One fetched record.
pub type Row = Map<String, Value>;

/// Every read the cache can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// All rows of a category.
    Category(Category),
    /// One guild's rows of a guild-scoped category.
    CategoryForGuild(Category, GuildId),
    /// Ids of guilds whose settings row is marked initialized.
    ConfiguredGuilds,
}

impl Query {
    /// Collection the query reads from.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Category(category) | Self::CategoryForGuild(category, _) => {
                category.descriptor().collection
            }
            Self::ConfiguredGuilds => Category::GuildSettings.descriptor().collection,
        }
    }

    /// Category the query feeds, if any.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Category(category) | Self::CategoryForGuild(category, _) => Some(*category),
            Self::ConfiguredGuilds => None,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(category) => write!(f, "{category}"),
            Self::CategoryForGuild(category, guild_id) => write!(f, "{category} (guild {guild_id})"),
            Self::ConfiguredGuilds => f.write_str("configured guilds"),
        }
    }
}

/// Failures of a query backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("guild id {0} cannot be represented by the database")]
    InvalidGuildId(GuildId),

    #[error("malformed document in {collection}: {reason}")]
    MalformedDocument {
        collection: &'static str,
        reason: String,
    },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous read access to the authoritative store.
pub trait QueryBackend: Send + Sync + 'static {
    fn fetch(&self, query: Query) -> impl Future<Output = Result<Vec<Row>, BackendError>> + Send;
}

/// Read an id field that may be stored as a number or a numeric string.
pub(crate) fn row_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

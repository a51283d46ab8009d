//! Cache error types.

use std::time::Duration;

use thiserror::Error;

use super::Category;
use super::key::{GuildId, KeyFormatViolation};
use crate::database::BackendError;

/// Failures surfaced by the cache facade and loader.
///
/// Misses are never errors; they come back as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A reload triggered by a miss could not fetch from the backend.
    #[error("reload of {category} for guild {guild_id} failed")]
    ReloadFailure {
        category: Category,
        guild_id: GuildId,
        #[source]
        source: BackendError,
    },

    /// The initial load did not finish in time.
    #[error("initial cache load did not complete within {0:?}")]
    LoadTimeout(Duration),

    /// A whole-category fetch failed.
    #[error("loading {category} failed")]
    CategoryLoad {
        category: Category,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    KeyFormat(#[from] KeyFormatViolation),
}

impl CacheError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ReloadFailure { .. } | Self::LoadTimeout(_) | Self::CategoryLoad { .. }
        )
    }
}

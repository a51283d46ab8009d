//! Cache module - process-wide TTL cache over the query backend.
//!
//! ## Architecture
//!
//! - `EntryStore` - one moka cache per category, per-entry expiry
//! - `CategoryRegistry` - effective TTL and key shape for every category
//! - `GlobalCache` - read/write/invalidate facade with reload-on-miss
//! - `CacheLoader` - one-shot parallel preload and readiness signal
//! - `ConfiguredGuilds` - TTL-cached set of guilds that finished setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! let ctx = CacheContext::new(Arc::new(db), CacheConfig::default());
//! ctx.loader.load_all_shared_data().await;
//!
//! ctx.loader.wait_for_initial_load().await?;
//! let roles = ctx.cache.get_guild_data(guild_id, Category::GuildRoles, None).await?;
//! ```

mod category;
mod config;
mod context;
mod entry;
mod error;
mod facade;
mod guard;
mod hot;
mod key;
mod loader;
mod metrics;
mod registry;
mod store;

pub use category::{Category, CategoryDescriptor, Layout, Scope};
pub use config::CacheConfig;
pub use context::CacheContext;
pub use entry::{CacheEntry, CacheValue};
pub use error::CacheError;
pub use facade::{GlobalCache, MaintenanceSummary};
pub use guard::ConfiguredGuilds;
pub use hot::HotKeys;
pub use key::{CacheKey, GuildId, KeyFormatViolation, KeyParts};
pub use loader::{CacheLoader, LoadReport, LoaderState};
pub use metrics::{CategorySnapshot, HealthReport, HealthStatus, MetricsSnapshot};
pub use registry::CategoryRegistry;
pub use store::EntryStore;

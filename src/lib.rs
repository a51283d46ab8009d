//! Citadel - cache and cache-loading core of a guild-management bot.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Query backends (MongoDB, in-memory)
//! - `cache` - TTL cache, loader and configured-guild guard

pub mod cache;
pub mod config;
pub mod database;

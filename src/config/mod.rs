//! Configuration module for Citadel.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::{CacheConfig, Category};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns error if `MONGODB_URI` is missing or a numeric variable does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        let mongodb_uri = env::var("MONGODB_URI").context("MONGODB_URI must be set")?;
        let mongodb_database =
            env::var("MONGODB_DATABASE").unwrap_or_else(|_| "citadel".to_string());

        Ok(Self {
            mongodb_uri,
            mongodb_database,
            cache: cache_config(|name| env::var(name).ok())?,
        })
    }
}

/// Build the cache configuration from variables returned by `var`.
fn cache_config(var: impl Fn(&str) -> Option<String>) -> Result<CacheConfig> {
    let secs = |name: &str| -> Result<Option<Duration>> {
        Ok(parse_var::<u64>(name, var(name))?.map(Duration::from_secs))
    };

    let mut cache = CacheConfig::default();

    if let Some(capacity) = parse_var::<u64>("CACHE_MAX_CAPACITY", var("CACHE_MAX_CAPACITY"))? {
        cache = cache.max_capacity(capacity);
    }
    if let Some(ttl) = secs("CONFIGURED_GUILDS_TTL_SECS")? {
        cache = cache.configured_guilds_ttl(ttl);
    }
    if let Some(timeout) = secs("CACHE_LOAD_TIMEOUT_SECS")? {
        cache = cache.load_timeout(timeout);
    }
    if let Some(interval) = secs("CACHE_SWEEP_INTERVAL_SECS")? {
        cache = cache.sweep_interval(interval);
    }

    let threshold = parse_var::<u64>("CACHE_HOT_KEY_THRESHOLD", var("CACHE_HOT_KEY_THRESHOLD"))?
        .unwrap_or(cache.hot_key_threshold);
    let window = secs("CACHE_HOT_KEY_WINDOW_SECS")?.unwrap_or(cache.hot_key_window);
    cache = cache.hot_keys(threshold, window);

    // Per-category TTL overrides: CACHE_TTL_GUILD_SETTINGS=3600
    for category in Category::ALL {
        if let Some(ttl) = secs(ttl_var(category).as_str())? {
            cache = cache.ttl(category, ttl);
        }
    }

    Ok(cache)
}

fn ttl_var(category: Category) -> String {
    format!("CACHE_TTL_{}", category.name().to_uppercase())
}

fn parse_var<T>(name: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<CacheConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        cache_config(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_ttl_variable_names() {
        assert_eq!(ttl_var(Category::EpicItems), "CACHE_TTL_EPIC_ITEMS");
        assert_eq!(ttl_var(Category::GuildPtbSettings), "CACHE_TTL_GUILD_PTB_SETTINGS");
    }

    #[test]
    fn test_defaults_without_variables() {
        let cache = config_from(&[]).unwrap();
        assert_eq!(cache.sweep_interval, Duration::from_secs(300));
        assert_eq!(cache.configured_guilds_ttl, Duration::from_secs(1800));
        assert!(cache.ttl_overrides.is_empty());
    }

    #[test]
    fn test_variables_are_applied() {
        let cache = config_from(&[
            ("CACHE_SWEEP_INTERVAL_SECS", "60"),
            ("CACHE_LOAD_TIMEOUT_SECS", " 5 "),
            ("CACHE_HOT_KEY_THRESHOLD", "8"),
            ("CACHE_TTL_EPIC_ITEMS", "1"),
            ("CACHE_MAX_CAPACITY", ""),
        ])
        .unwrap();

        assert_eq!(cache.sweep_interval, Duration::from_secs(60));
        assert_eq!(cache.load_timeout, Duration::from_secs(5));
        assert_eq!(cache.hot_key_threshold, 8);
        assert_eq!(cache.hot_key_window, Duration::from_secs(900));
        assert_eq!(cache.ttl_overrides[&Category::EpicItems], Duration::from_secs(1));
        assert_eq!(cache.max_capacity, 50_000);
    }

    #[test]
    fn test_zero_sweep_interval_is_clamped() {
        let cache = config_from(&[("CACHE_SWEEP_INTERVAL_SECS", "0")]).unwrap();
        assert!(cache.sweep_interval > Duration::ZERO);
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let error = config_from(&[("CACHE_LOAD_TIMEOUT_SECS", "ten")]).unwrap_err();
        assert!(error.to_string().contains("CACHE_LOAD_TIMEOUT_SECS"));
    }
}

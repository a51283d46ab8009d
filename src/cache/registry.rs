//! Category registry - effective lifetimes for every category.

use std::time::Duration;

use tracing::{debug, info};

use super::category::{Category, CategoryDescriptor};
use super::key;
use super::CacheConfig;

/// Resolved view of the category table for one process.
///
/// Built once from the static descriptors plus configured TTL overrides and
/// never mutated afterwards.
#[derive(Clone)]
pub struct CategoryRegistry {
    ttls: [Duration; Category::COUNT],
}

impl CategoryRegistry {
    pub fn new(config: &CacheConfig) -> Self {
        debug_assert!(
            Category::ALL.into_iter().all(key::round_trips),
            "every category key must survive format and parse unchanged"
        );

        let ttls = std::array::from_fn(|index| {
            let category = Category::ALL[index];
            match config.ttl_overrides.get(&category) {
                Some(ttl) => {
                    debug!("TTL override for {}: {:?}", category, ttl);
                    *ttl
                }
                None => category.descriptor().default_ttl,
            }
        });

        info!(
            "Category registry initialized with {} categories ({} preloaded)",
            Category::COUNT,
            Category::ALL.iter().filter(|c| c.descriptor().preload).count()
        );

        Self { ttls }
    }

    pub fn descriptor(&self, category: Category) -> &'static CategoryDescriptor {
        category.descriptor()
    }

    /// Effective TTL of a category.
    pub fn ttl(&self, category: Category) -> Duration {
        self.ttls[category.index()]
    }

    /// Categories loaded by the startup batch.
    pub fn preload_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(|category| category.descriptor().preload)
    }

    /// Guild-scoped categories.
    pub fn guild_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(|category| category.descriptor().is_guild_scoped())
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl std::fmt::Debug for CategoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(Category::ALL.iter().map(|c| (c.name(), self.ttl(*c))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let registry = CategoryRegistry::default();
        assert_eq!(
            registry.ttl(Category::GuildSettings),
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(
            registry.ttl(Category::EpicItems),
            Duration::from_secs(30 * 24 * 3600)
        );
    }

    #[test]
    fn test_ttl_override() {
        let config = CacheConfig::default().ttl(Category::EpicItems, Duration::from_secs(1));
        let registry = CategoryRegistry::new(&config);

        assert_eq!(registry.ttl(Category::EpicItems), Duration::from_secs(1));
        assert_eq!(
            registry.ttl(Category::Weapons),
            Category::Weapons.descriptor().default_ttl
        );
    }

    #[test]
    fn test_category_iterators() {
        let registry = CategoryRegistry::default();
        assert_eq!(registry.preload_categories().count(), 16);
        assert!(registry.guild_categories().all(|c| c.descriptor().is_guild_scoped()));
        assert!(!registry.guild_categories().any(|c| c == Category::Weapons));
    }
}

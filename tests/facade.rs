mod common;

use std::time::Duration;

use serde_json::json;

use citadel::cache::{CacheConfig, CacheKey, Category, GuildId, HealthStatus, KeyParts};
use citadel::database::Query;

use common::{G1, G2, G3, context, context_with, seeded_backend};

#[tokio::test]
async fn test_invalidate_guild_is_isolated() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    let removed = ctx.cache.invalidate_guild(G1);
    // 11 preloaded guild categories, two rows in guild_members
    assert_eq!(removed, 12);

    for category in ctx.cache.registry().guild_categories() {
        for guild in [G1, G2] {
            let parts = match category.descriptor().layout.subkey_field() {
                Some("event_id") => KeyParts::guild(guild).with_subkey("e1"),
                Some("group_name") => KeyParts::guild(guild).with_subkey("alpha"),
                Some(_) => KeyParts::guild(guild).with_subkey("501"),
                None => KeyParts::guild(guild),
            };
            let key = CacheKey::new(category, parts).unwrap();
            let expect_present = guild == G2 && category.descriptor().preload;
            assert_eq!(ctx.cache.get(&key).is_some(), expect_present, "{key}");
        }
    }
    assert!(ctx.cache.get_static_data(Category::EpicItems, None).unwrap().is_some());
}

#[tokio::test]
async fn test_reload_after_invalidation_is_scoped_to_guild() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;
    ctx.cache.invalidate_guild(G1);

    let settings = ctx
        .cache
        .get_guild_data(G1, Category::GuildSettings, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings["guild_lang"], "en");
    assert_eq!(backend.count_for_guild(Category::GuildSettings, G1), 1);

    let settings = ctx
        .cache
        .get_guild_data(G2, Category::GuildSettings, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings["guild_lang"], "fr");
    assert_eq!(backend.count_for_guild(Category::GuildSettings, G2), 0);

    // a reload fills every subkey of the guild, not just the one asked for
    ctx.cache
        .get_guild_data(G1, Category::GuildMembers, Some("501"))
        .await
        .unwrap();
    let other = ctx
        .cache
        .get_guild_data(G1, Category::GuildMembers, Some("502"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(other["class"], "healer");
    assert_eq!(backend.count_for_guild(Category::GuildMembers, G1), 1);
}

#[tokio::test]
async fn test_unconfigured_guild_never_reloads() {
    let backend = seeded_backend();
    backend.insert(Category::GuildRoles, json!({ "guild_id": G3.get(), "members": 5 }));
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;
    ctx.cache.invalidate_guild(G3);
    let roles_queries = backend.count_for(Category::GuildRoles);

    for category in ctx.cache.registry().guild_categories() {
        let subkey = category.descriptor().layout.subkey_field().map(|_| "1");
        let value = ctx.cache.get_guild_data(G3, category, subkey).await.unwrap();
        assert!(value.is_none());
    }

    assert_eq!(backend.count_for(Category::GuildRoles), roles_queries);
    assert!(backend
        .queries()
        .iter()
        .all(|query| !matches!(query, Query::CategoryForGuild(..))));
    assert_eq!(backend.count_configured_guilds(), 1);
    assert_eq!(ctx.cache.metrics().reloads_suppressed, 12);
}

#[tokio::test]
async fn test_guard_invalidation_admits_newly_configured_guild() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    assert!(ctx.cache.get_guild_data(G3, Category::GuildRoles, None).await.unwrap().is_none());

    // setup completes for G3
    backend.insert(Category::GuildSettings, json!({ "guild_id": G3.get(), "initialized": true }));
    backend.insert(Category::GuildRoles, json!({ "guild_id": G3.get(), "members": 7 }));
    assert!(ctx.cache.get_guild_data(G3, Category::GuildRoles, None).await.unwrap().is_none());

    ctx.cache.invalidate_configured_guilds_cache();
    let roles = ctx
        .cache
        .get_guild_data(G3, Category::GuildRoles, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(roles["members"], 7);
    assert_eq!(backend.count_configured_guilds(), 2);
}

#[tokio::test]
async fn test_writes_ignore_the_guard() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    ctx.cache
        .set_guild_data(G3, Category::GuildSettings, json!({ "guild_lang": "de" }), None)
        .unwrap();
    let settings = ctx
        .cache
        .get_guild_data(G3, Category::GuildSettings, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings["guild_lang"], "de");
    assert_eq!(backend.count_configured_guilds(), 0);
}

#[tokio::test]
async fn test_category_ttl_override_expires_entry() {
    let backend = seeded_backend();
    let config = CacheConfig::default().ttl(Category::EpicItems, Duration::from_secs(1));
    let ctx = context_with(&backend, config);

    ctx.cache
        .set_static_data(Category::EpicItems, None, json!([{ "item_id": 9 }]))
        .unwrap();
    assert!(ctx.cache.get_static_data(Category::EpicItems, None).unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(ctx.cache.get_static_data(Category::EpicItems, None).unwrap().is_none());
}

#[tokio::test]
async fn test_preloaded_entries_are_reachable_through_lookups() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    let welcome = ctx
        .cache
        .get_guild_data(G1, Category::WelcomeMessages, Some("501"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(welcome["message_id"], 41);

    let staff = ctx
        .cache
        .get_guild_data(G2, Category::GuildIdealStaff, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(staff.as_array().map(Vec::len), Some(2));

    let weapons = ctx.cache.get_static_data(Category::Weapons, Some(1)).unwrap().unwrap();
    assert_eq!(weapons.as_array().map(Vec::len), Some(2));
    let game = ctx.cache.get_static_data(Category::GamesList, Some(2)).unwrap().unwrap();
    assert_eq!(game["game_name"], "second");

    let key: CacheKey = "user_setup:1002:501".parse().unwrap();
    assert_eq!(ctx.cache.get(&key).unwrap()["locale"], "fr");

    assert_eq!(backend.query_count(), 16);
}

#[tokio::test]
async fn test_invalidate_category_and_related() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    assert_eq!(ctx.cache.invalidate_category(Category::Weapons), 2);
    assert!(ctx.cache.get_static_data(Category::Weapons, Some(1)).unwrap().is_none());

    assert_eq!(ctx.cache.invalidate_related(Category::UserSetup, Some(G2)), 2);
    let member = CacheKey::guild(Category::GuildMembers, G2, Some("501")).unwrap();
    assert!(ctx.cache.get(&member).is_none());
    let member = CacheKey::guild(Category::GuildMembers, G1, Some("501")).unwrap();
    assert!(ctx.cache.get(&member).is_some());
}

#[tokio::test]
async fn test_hot_keys_refresh_ahead_of_expiry() {
    let backend = seeded_backend();
    let config = CacheConfig::default()
        .ttl(Category::GuildChannels, Duration::from_secs(1))
        .hot_keys(2, Duration::from_secs(60));
    let ctx = context_with(&backend, config);
    ctx.loader.load_all_shared_data().await;

    for _ in 0..2 {
        ctx.cache
            .get_guild_data(G1, Category::GuildChannels, None)
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(ctx.cache.metrics().hot_keys, 1);

    // inside the last fifth of the lifetime
    tokio::time::sleep(Duration::from_millis(850)).await;
    let summary = ctx.cache.run_maintenance().await;

    assert_eq!(summary.refreshed, 1);
    assert_eq!(backend.count_for_guild(Category::GuildChannels, G1), 1);
    assert_eq!(backend.count_for_guild(Category::GuildChannels, G2), 0);
    assert_eq!(ctx.cache.metrics().refreshed_ahead, 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let channels = ctx.cache.get_guild_data(G1, Category::GuildChannels, None).await.unwrap();
    assert!(channels.is_some());
    assert_eq!(backend.count_for_guild(Category::GuildChannels, G1), 1);
}

#[tokio::test]
async fn test_idle_hot_key_stops_refreshing() {
    let backend = seeded_backend();
    let config = CacheConfig::default()
        .ttl(Category::GuildChannels, Duration::from_secs(1))
        .hot_keys(2, Duration::from_millis(500));
    let ctx = context_with(&backend, config);
    ctx.loader.load_all_shared_data().await;

    for _ in 0..2 {
        ctx.cache
            .get_guild_data(G1, Category::GuildChannels, None)
            .await
            .unwrap()
            .unwrap();
    }

    // the window after the one that made it hot
    tokio::time::sleep(Duration::from_millis(850)).await;
    assert_eq!(ctx.cache.run_maintenance().await.refreshed, 1);
    assert_eq!(backend.count_for_guild(Category::GuildChannels, G1), 1);

    // no reads since: the refreshed entry is near expiry again but the key cooled
    tokio::time::sleep(Duration::from_millis(850)).await;
    let summary = ctx.cache.run_maintenance().await;
    assert_eq!(summary.refreshed, 0);
    assert!(summary.pruned >= 1);
    assert_eq!(ctx.cache.metrics().hot_keys, 0);
    assert_eq!(backend.count_for_guild(Category::GuildChannels, G1), 1);
}

#[tokio::test]
async fn test_invalidation_is_not_an_eviction() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    let removed: usize = Category::ALL
        .iter()
        .map(|&category| ctx.cache.invalidate_category(category))
        .sum();
    assert!(removed > 0);
    ctx.cache.sweep();

    let metrics = ctx.cache.metrics();
    assert_eq!(metrics.evictions, 0);
    assert_eq!(ctx.cache.health_check().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_metrics_and_health() {
    let backend = seeded_backend();
    let ctx = context(&backend);
    ctx.loader.load_all_shared_data().await;

    ctx.cache.get_guild_data(G1, Category::GuildRoles, None).await.unwrap();
    ctx.cache.get_guild_data(G3, Category::GuildRoles, None).await.unwrap();

    let metrics = ctx.cache.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hit_rate, 50.0);
    assert_eq!(metrics.reloads_suppressed, 1);
    assert_eq!(metrics.by_category["guild_roles"].hits, 1);

    let report = ctx.cache.health_check();
    assert_eq!(report.status, HealthStatus::Healthy);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_maintenance_task_sweeps_until_aborted() {
    let backend = seeded_backend();
    let config = CacheConfig::default().sweep_interval(Duration::from_millis(50));
    let ctx = context_with(&backend, config);

    let key = CacheKey::guild(Category::GuildRoles, GuildId::new(77), None).unwrap();
    ctx.cache.set_with_ttl(key.clone(), json!({}), Duration::from_millis(10));

    let handle = ctx.spawn_maintenance();
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    handle.abort();

    assert!(handle.await.unwrap_err().is_cancelled());
    assert_eq!(ctx.cache.metrics().expirations, 1);
    assert_eq!(ctx.cache.entry_count(), 0);
}

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use citadel::cache::{CacheConfig, CacheContext, Category, GuildId};
use citadel::database::MemoryBackend;

pub const G1: GuildId = GuildId::new(1001);
pub const G2: GuildId = GuildId::new(1002);
/// Present on the platform, never ran setup.
pub const G3: GuildId = GuildId::new(1003);

/// A backend with two configured guilds and rows for every category.
pub fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());

    for (guild, lang) in [(G1, "en"), (G2, "fr")] {
        let id = guild.get();
        backend.insert(
            Category::GuildSettings,
            json!({ "guild_id": id, "guild_lang": lang, "initialized": true }),
        );
        backend.insert(Category::GuildRoles, json!({ "guild_id": id, "members": 10 }));
        backend.insert(Category::GuildChannels, json!({ "guild_id": id, "rules": 20 }));
        backend.insert(Category::GuildPtbSettings, json!({ "guild_id": id, "ptb_guild_id": 30 }));
        backend.insert(
            Category::WelcomeMessages,
            json!({ "guild_id": id, "member_id": 501, "channel_id": 40, "message_id": 41 }),
        );
        backend.insert(Category::AbsenceMessages, json!({ "guild_id": id, "member_id": 501 }));
        backend.insert_many(
            Category::GuildMembers,
            [
                json!({ "guild_id": id, "member_id": 501, "class": "tank" }),
                json!({ "guild_id": id, "member_id": 502, "class": "healer" }),
            ],
        );
        backend.insert(Category::UserSetup, json!({ "guild_id": id, "user_id": 501, "locale": lang }));
        backend.insert(Category::EventsData, json!({ "guild_id": id, "event_id": "e1", "name": "raid" }));
        backend.insert(Category::StaticGroups, json!({ "guild_id": id, "group_name": "alpha" }));
        backend.insert_many(
            Category::GuildIdealStaff,
            [
                json!({ "guild_id": id, "class_name": "tank", "count": 2 }),
                json!({ "guild_id": id, "class_name": "healer", "count": 3 }),
            ],
        );
        backend.insert(Category::LootWishlist, json!({ "guild_id": id, "member_id": 501, "item": "sword" }));
    }

    backend.insert_many(
        Category::Weapons,
        [
            json!({ "game_id": 1, "code": "SNS" }),
            json!({ "game_id": 1, "code": "GS" }),
            json!({ "game_id": 2, "code": "B" }),
        ],
    );
    backend.insert(Category::WeaponsCombinations, json!({ "game_id": 1, "role": "tank", "weapon1": "SNS" }));
    backend.insert_many(
        Category::GamesList,
        [json!({ "id": 1, "game_name": "first" }), json!({ "id": 2, "game_name": "second" })],
    );
    backend.insert_many(
        Category::EpicItems,
        [json!({ "item_id": 1, "name": "crown" }), json!({ "item_id": 2, "name": "orb" })],
    );
    backend.insert(Category::EventsCalendar, json!({ "game_id": 1, "day": 3, "name": "siege" }));

    backend
}

pub fn context(backend: &Arc<MemoryBackend>) -> CacheContext<MemoryBackend> {
    context_with(backend, CacheConfig::default())
}

pub fn context_with(backend: &Arc<MemoryBackend>, config: CacheConfig) -> CacheContext<MemoryBackend> {
    CacheContext::new(Arc::clone(backend), config)
}

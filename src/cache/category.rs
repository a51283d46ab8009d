//! Cache categories and their static descriptors.
//!
//! The table here is the single source of truth for every category: its
//! default lifetime, how its keys are shaped, which collection it is loaded
//! from, and whether the startup loader preloads it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::key::{KeyFormatViolation, KeyParts};
use crate::database::{Row, row_id};

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Logical grouping of cache entries sharing a lifetime and key shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    GuildSettings,
    GuildRoles,
    GuildChannels,
    GuildPtbSettings,
    WelcomeMessages,
    AbsenceMessages,
    GuildMembers,
    UserSetup,
    EventsData,
    StaticGroups,
    GuildIdealStaff,
    LootWishlist,
    Weapons,
    WeaponsCombinations,
    GamesList,
    EpicItems,
    EventsCalendar,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 17] = [
        Category::GuildSettings,
        Category::GuildRoles,
        Category::GuildChannels,
        Category::GuildPtbSettings,
        Category::WelcomeMessages,
        Category::AbsenceMessages,
        Category::GuildMembers,
        Category::UserSetup,
        Category::EventsData,
        Category::StaticGroups,
        Category::GuildIdealStaff,
        Category::LootWishlist,
        Category::Weapons,
        Category::WeaponsCombinations,
        Category::GamesList,
        Category::EpicItems,
        Category::EventsCalendar,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position of this category in [`Category::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn descriptor(self) -> &'static CategoryDescriptor {
        &DESCRIPTORS[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = KeyFormatViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DESCRIPTORS
            .iter()
            .find(|descriptor| descriptor.name == s)
            .map(|descriptor| descriptor.category)
            .ok_or_else(|| KeyFormatViolation::UnknownCategory(s.to_owned()))
    }
}

/// What the scope id of a category's keys refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Keyed by guild, read from the row's `guild_id` field.
    Guild,
    /// Keyed by game, read from the named row field.
    Game { field: &'static str },
    /// One entry for the whole category.
    Global,
}

impl Scope {
    pub const fn is_scoped(self) -> bool {
        !matches!(self, Scope::Global)
    }

    /// Row field holding the scope id.
    pub const fn field(self) -> Option<&'static str> {
        match self {
            Scope::Guild => Some("guild_id"),
            Scope::Game { field } => Some(field),
            Scope::Global => None,
        }
    }
}

/// How the rows of a category map onto entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One row per scope.
    Single,
    /// All rows of a scope collected into one array.
    List,
    /// One entry per row, told apart by the named field.
    Keyed { field: &'static str },
}

impl Layout {
    pub const fn subkey_field(self) -> Option<&'static str> {
        match self {
            Layout::Keyed { field } => Some(field),
            Layout::Single | Layout::List => None,
        }
    }
}

/// Static, immutable description of one category.
#[derive(Debug)]
pub struct CategoryDescriptor {
    pub category: Category,
    pub name: &'static str,
    /// Collection the category is loaded from.
    pub collection: &'static str,
    pub default_ttl: Duration,
    pub scope: Scope,
    pub layout: Layout,
    /// Loaded by the startup batch; otherwise only on demand.
    pub preload: bool,
    /// Categories derived from this one, cleared by `invalidate_related`.
    pub dependents: &'static [Category],
}

impl CategoryDescriptor {
    pub const fn is_guild_scoped(&self) -> bool {
        matches!(self.scope, Scope::Guild)
    }

    /// Turn fetched rows into key parts and values.
    ///
    /// Rows missing their scope or subkey field are skipped.
    pub fn arrange(&self, rows: Vec<Row>) -> Vec<(KeyParts, Value)> {
        let mut entries = Vec::with_capacity(rows.len());
        let mut lists: BTreeMap<Option<u64>, Vec<Value>> = BTreeMap::new();

        for row in rows {
            let scope = match self.scope.field() {
                Some(field) => match row.get(field).and_then(row_id) {
                    Some(scope) => Some(scope),
                    None => {
                        warn!("Skipping {} row without a usable {} field", self.name, field);
                        continue;
                    }
                },
                None => None,
            };

            match self.layout {
                Layout::Single => {
                    entries.push((KeyParts { scope, subkey: None }, Value::Object(row)));
                }
                Layout::List => {
                    lists.entry(scope).or_default().push(Value::Object(row));
                }
                Layout::Keyed { field } => match row.get(field).and_then(subkey_text) {
                    Some(subkey) => {
                        let parts = KeyParts {
                            scope,
                            subkey: Some(subkey),
                        };
                        entries.push((parts, Value::Object(row)));
                    }
                    None => {
                        warn!("Skipping {} row without a usable {} field", self.name, field);
                    }
                },
            }
        }

        entries.extend(
            lists
                .into_iter()
                .map(|(scope, items)| (KeyParts { scope, subkey: None }, Value::Array(items))),
        );
        entries
    }
}

fn subkey_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

const fn days(n: u64) -> Duration {
    Duration::from_secs(n * DAY)
}

static DESCRIPTORS: [CategoryDescriptor; Category::COUNT] = [
    CategoryDescriptor {
        category: Category::GuildSettings,
        name: "guild_settings",
        collection: "guild_settings",
        default_ttl: days(7),
        scope: Scope::Guild,
        layout: Layout::Single,
        preload: true,
        dependents: &[Category::GuildRoles, Category::GuildChannels],
    },
    CategoryDescriptor {
        category: Category::GuildRoles,
        name: "guild_roles",
        collection: "guild_roles",
        default_ttl: days(7),
        scope: Scope::Guild,
        layout: Layout::Single,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::GuildChannels,
        name: "guild_channels",
        collection: "guild_channels",
        default_ttl: days(7),
        scope: Scope::Guild,
        layout: Layout::Single,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::GuildPtbSettings,
        name: "guild_ptb_settings",
        collection: "guild_ptb_settings",
        default_ttl: days(7),
        scope: Scope::Guild,
        layout: Layout::Single,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::WelcomeMessages,
        name: "welcome_messages",
        collection: "welcome_messages",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "member_id" },
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::AbsenceMessages,
        name: "absence_messages",
        collection: "absence_messages",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "member_id" },
        preload: false,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::GuildMembers,
        name: "guild_members",
        collection: "guild_members",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "member_id" },
        preload: true,
        dependents: &[Category::EventsData, Category::StaticGroups],
    },
    CategoryDescriptor {
        category: Category::UserSetup,
        name: "user_setup",
        collection: "user_setup",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "user_id" },
        preload: true,
        dependents: &[Category::GuildMembers],
    },
    CategoryDescriptor {
        category: Category::EventsData,
        name: "events_data",
        collection: "events_data",
        default_ttl: days(2),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "event_id" },
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::StaticGroups,
        name: "static_groups",
        collection: "guild_static_groups",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::Keyed { field: "group_name" },
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::GuildIdealStaff,
        name: "guild_ideal_staff",
        collection: "guild_ideal_staff",
        default_ttl: days(7),
        scope: Scope::Guild,
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::LootWishlist,
        name: "loot_wishlist",
        collection: "loot_wishlist",
        default_ttl: days(1),
        scope: Scope::Guild,
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::Weapons,
        name: "weapons",
        collection: "weapons",
        default_ttl: days(30),
        scope: Scope::Game { field: "game_id" },
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::WeaponsCombinations,
        name: "weapons_combinations",
        collection: "weapons_combinations",
        default_ttl: days(30),
        scope: Scope::Game { field: "game_id" },
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::GamesList,
        name: "games_list",
        collection: "games_list",
        default_ttl: days(30),
        scope: Scope::Game { field: "id" },
        layout: Layout::Single,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::EpicItems,
        name: "epic_items",
        collection: "epic_items_t2",
        default_ttl: days(30),
        scope: Scope::Global,
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
    CategoryDescriptor {
        category: Category::EventsCalendar,
        name: "events_calendar",
        collection: "events_calendar",
        default_ttl: days(30),
        scope: Scope::Game { field: "game_id" },
        layout: Layout::List,
        preload: true,
        dependents: &[],
    },
];

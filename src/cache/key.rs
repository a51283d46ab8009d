//! Cache keys and their canonical string form.
//!
//! Every key is built through [`CacheKey::new`], which checks the parts
//! against the category's scope and layout. Reads, writes, bulk loads and
//! invalidation all go through it, so a category can never end up with two
//! key shapes for the same entry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::Category;

/// Discord guild (server) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(u64);

impl GuildId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for GuildId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key whose shape does not match its category.
///
/// This is a programming error: callers pass the wrong category or forget a
/// subkey. It is surfaced as a value so tests can assert on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFormatViolation {
    #[error("category {category} requires a scope id")]
    MissingScope { category: Category },

    #[error("category {category} is not scoped, got scope {scope}")]
    UnexpectedScope { category: Category, scope: u64 },

    #[error("category {category} requires a subkey")]
    MissingSubkey { category: Category },

    #[error("category {category} does not take a subkey, got {subkey:?}")]
    UnexpectedSubkey { category: Category, subkey: String },

    #[error("category {category} was given an empty subkey")]
    EmptySubkey { category: Category },

    #[error("category {category} is not guild scoped")]
    NotGuildScoped { category: Category },

    #[error("unknown cache category {0:?}")]
    UnknownCategory(String),

    #[error("malformed cache key {0:?}")]
    Malformed(String),
}

/// Raw key components, before they are checked against a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParts {
    pub scope: Option<u64>,
    pub subkey: Option<String>,
}

impl KeyParts {
    /// Parts for a category with no scope (a single global entry).
    pub fn unscoped() -> Self {
        Self::default()
    }

    /// Parts for a game- or guild-scoped entry.
    pub fn scoped(scope: u64) -> Self {
        Self {
            scope: Some(scope),
            subkey: None,
        }
    }

    pub fn guild(guild_id: GuildId) -> Self {
        Self::scoped(guild_id.get())
    }

    #[must_use]
    pub fn with_subkey(mut self, subkey: impl Into<String>) -> Self {
        self.subkey = Some(subkey.into());
        self
    }
}

/// Canonical identifier of one cache entry: `(category, scope?, subkey?)`.
///
/// Cloning is cheap; the subkey is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: Category,
    scope: Option<u64>,
    subkey: Option<Arc<str>>,
}

impl CacheKey {
    /// Build a key, checking the parts against the category's shape.
    pub fn new(category: Category, parts: KeyParts) -> Result<Self, KeyFormatViolation> {
        let descriptor = category.descriptor();

        let scope = match (descriptor.scope.is_scoped(), parts.scope) {
            (true, Some(scope)) => Some(scope),
            (true, None) => return Err(KeyFormatViolation::MissingScope { category }),
            (false, Some(scope)) => {
                return Err(KeyFormatViolation::UnexpectedScope { category, scope });
            }
            (false, None) => None,
        };

        let subkey = match (descriptor.layout.subkey_field().is_some(), parts.subkey) {
            (true, Some(subkey)) if subkey.is_empty() => {
                return Err(KeyFormatViolation::EmptySubkey { category });
            }
            (true, Some(subkey)) => Some(Arc::from(subkey)),
            (true, None) => return Err(KeyFormatViolation::MissingSubkey { category }),
            (false, Some(subkey)) => {
                return Err(KeyFormatViolation::UnexpectedSubkey { category, subkey });
            }
            (false, None) => None,
        };

        Ok(Self {
            category,
            scope,
            subkey,
        })
    }

    /// Build a key for a guild-scoped category.
    pub fn guild(
        category: Category,
        guild_id: GuildId,
        subkey: Option<&str>,
    ) -> Result<Self, KeyFormatViolation> {
        if !category.descriptor().is_guild_scoped() {
            return Err(KeyFormatViolation::NotGuildScoped { category });
        }

        let mut parts = KeyParts::guild(guild_id);
        parts.subkey = subkey.map(str::to_owned);
        Self::new(category, parts)
    }

    /// Parse the canonical `category[:scope][:subkey]` form.
    pub fn parse(raw: &str) -> Result<Self, KeyFormatViolation> {
        let malformed = || KeyFormatViolation::Malformed(raw.to_owned());

        let (name, mut rest) = match raw.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (raw, None),
        };

        let category: Category = name.parse()?;
        let descriptor = category.descriptor();
        let mut parts = KeyParts::default();

        if descriptor.scope.is_scoped() {
            let scoped = rest.ok_or_else(malformed)?;
            let (scope, tail) = match scoped.split_once(':') {
                Some((scope, tail)) => (scope, Some(tail)),
                None => (scoped, None),
            };
            parts.scope = Some(scope.parse().map_err(|_| malformed())?);
            rest = tail;
        }

        if descriptor.layout.subkey_field().is_some() {
            parts.subkey = rest.take().map(str::to_owned);
        }

        if rest.is_some() {
            return Err(malformed());
        }

        Self::new(category, parts)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn scope(&self) -> Option<u64> {
        self.scope
    }

    /// The guild this key belongs to, if its category is guild scoped.
    pub fn guild_id(&self) -> Option<GuildId> {
        if self.category.descriptor().is_guild_scoped() {
            self.scope.map(GuildId::new)
        } else {
            None
        }
    }

    pub fn subkey(&self) -> Option<&str> {
        self.subkey.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category.name())?;
        if let Some(scope) = self.scope {
            write!(f, ":{scope}")?;
        }
        if let Some(subkey) = &self.subkey {
            write!(f, ":{subkey}")?;
        }
        Ok(())
    }
}

impl FromStr for CacheKey {
    type Err = KeyFormatViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a representative key of `category` survives format then parse.
pub(crate) fn round_trips(category: Category) -> bool {
    let descriptor = category.descriptor();
    let mut parts = KeyParts::default();
    if descriptor.scope.is_scoped() {
        parts.scope = Some(1_234_567_890_123_456_789);
    }
    if descriptor.layout.subkey_field().is_some() {
        parts.subkey = Some("98765:with-colon".to_owned());
    }

    CacheKey::new(category, parts)
        .is_ok_and(|key| CacheKey::parse(&key.to_string()).as_ref() == Ok(&key))
}

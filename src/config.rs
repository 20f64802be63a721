//! Configuration types.

use std::collections::HashSet;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pond::model::{EmojiId, GuildId, RoleId, WebhookId};

/// Fallback trigger symbol, counted alongside the configured custom emoji.
pub const DUCK_SYMBOL: &str = "\u{1F986}";

/// Reaction the bot leaves on a message once it has been relayed.
pub const COMPLETION_SYMBOL: &str = "\u{2705}";

/// Default relay threshold (distinct trusted reactors).
pub const DEFAULT_THRESHOLD: usize = 5;

/// Default destination upload limit: Discord's 8 MiB non-boosted guild limit.
pub const DEFAULT_UPLOAD_LIMIT: u64 = 8 * 1024 * 1024;

/// Relay rules. Loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Number of distinct trusted reactors needed to relay.
    pub threshold: usize,
    /// Custom emoji ids that count as ducks.
    pub custom_emojis: HashSet<EmojiId>,
    /// Roles whose members are trusted.
    pub staff_roles: HashSet<RoleId>,
    /// Webhook posting into the duck pond channel.
    pub webhook_id: WebhookId,
    /// Only react to events from this guild, if set.
    pub guild_id: Option<GuildId>,
    /// Upload limit of the destination, in bytes.
    pub upload_limit: u64,
}

impl RelayConfig {
    pub fn new(webhook_id: WebhookId, staff_roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            custom_emojis: HashSet::new(),
            staff_roles: staff_roles.into_iter().collect(),
            webhook_id,
            guild_id: None,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_custom_emojis(mut self, ids: impl IntoIterator<Item = EmojiId>) -> Self {
        self.custom_emojis = ids.into_iter().collect();
        self
    }

    pub fn with_guild(mut self, guild_id: GuildId) -> Self {
        self.guild_id = Some(guild_id);
        self
    }

    pub fn with_upload_limit(mut self, bytes: u64) -> Self {
        self.upload_limit = bytes;
        self
    }

    /// Build the relay rules from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let webhook_id = lookup("DUCK_POND_WEBHOOK_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("DUCK_POND_WEBHOOK_ID".into()))
            .and_then(|raw| parse_id("DUCK_POND_WEBHOOK_ID", &raw))?;

        let staff_roles = parse_id_list(
            "DUCK_POND_STAFF_ROLES",
            &lookup("DUCK_POND_STAFF_ROLES").unwrap_or_default(),
        )?;
        if staff_roles.is_empty() {
            return Err(ConfigError::MissingEnvVar("DUCK_POND_STAFF_ROLES".into()));
        }

        let threshold = match lookup("DUCK_POND_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => DEFAULT_THRESHOLD,
        };

        let custom_emojis = parse_id_list(
            "DUCK_POND_CUSTOM_EMOJIS",
            &lookup("DUCK_POND_CUSTOM_EMOJIS").unwrap_or_default(),
        )?;

        let guild_id = lookup("DUCK_POND_GUILD_ID")
            .map(|raw| parse_id("DUCK_POND_GUILD_ID", &raw))
            .transpose()?;

        let upload_limit = match lookup("DUCK_POND_UPLOAD_LIMIT") {
            Some(raw) => parse_id("DUCK_POND_UPLOAD_LIMIT", &raw)?,
            None => DEFAULT_UPLOAD_LIMIT,
        };

        Ok(Self {
            threshold,
            custom_emojis,
            staff_roles,
            webhook_id,
            guild_id,
            upload_limit,
        })
    }
}

/// Process configuration: the relay rules plus the bot credentials.
#[derive(Debug)]
pub struct Config {
    pub bot_token: SecretString,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into()))?;

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            relay: RelayConfig::from_env()?,
        })
    }
}

fn parse_id(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}

fn parse_id_list(key: &str, raw: &str) -> Result<HashSet<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(key, s))
        .collect()
}

fn parse_threshold(raw: &str) -> Result<usize, ConfigError> {
    let threshold: usize = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            key: "DUCK_POND_THRESHOLD".into(),
            message: format!("{raw:?}: {e}"),
        })?;
    if threshold == 0 {
        return Err(ConfigError::InvalidValue {
            key: "DUCK_POND_THRESHOLD".into(),
            message: "must be at least 1".into(),
        });
    }
    Ok(threshold)
}

//! Domain types for the relay engine.
//!
//! Everything here is a snapshot of platform state taken for a single
//! evaluation. Nothing is cached between events.

use std::fmt;
use std::hash::{Hash, Hasher};

pub type UserId = u64;
pub type RoleId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type GuildId = u64;
pub type EmojiId = u64;
pub type WebhookId = u64;
pub type AttachmentId = u64;

/// A reaction emoji, either a guild custom emoji or a plain unicode symbol.
///
/// Custom emoji compare by id only; the name is informational.
#[derive(Debug, Clone)]
pub enum EmojiValue {
    Custom { id: EmojiId, name: Option<String> },
    Symbol(String),
}

impl PartialEq for EmojiValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom { id: a, .. }, Self::Custom { id: b, .. }) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for EmojiValue {}

impl Hash for EmojiValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Custom { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Self::Symbol(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl EmojiValue {
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::Symbol(s.into())
    }

    pub fn custom(id: EmojiId) -> Self {
        Self::Custom { id, name: None }
    }
}

impl fmt::Display for EmojiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { id, name: Some(name) } => write!(f, "<:{name}:{id}>"),
            Self::Custom { id, name: None } => write!(f, "<:_:{id}>"),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

/// A platform account as seen at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Guild roles. `None` when the account is not (or no longer) a guild member.
    pub roles: Option<Vec<RoleId>>,
    pub is_bot: bool,
}

impl Actor {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar_url: None,
            roles: None,
            is_bot: false,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// One emoji on a message and everyone currently reacting with it.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub emoji: EmojiValue,
    pub reactors: Vec<Actor>,
}

impl Reaction {
    pub fn new(emoji: EmojiValue, reactors: Vec<Actor>) -> Self {
        Self { emoji, reactors }
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

/// Live view of a message, fetched fresh for every evaluation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Actor,
    /// Content with mentions rendered as readable text.
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Reactors currently using `emoji`, empty if nobody is.
    pub fn reactors_of(&self, emoji: &EmojiValue) -> &[Actor] {
        self.reactions
            .iter()
            .find(|r| &r.emoji == emoji)
            .map(|r| r.reactors.as_slice())
            .unwrap_or_default()
    }
}

/// Whether a reaction was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Added,
    Removed,
}

/// A single reaction change delivered by the gateway.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub actor_id: UserId,
    pub emoji: EmojiValue,
    pub polarity: Polarity,
}

/// Name and avatar a webhook post is made under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ProxyIdentity {
    /// Impersonate `actor`, with the name made acceptable as a webhook username.
    pub fn of(actor: &Actor) -> Self {
        Self {
            display_name: sanitize_username(&actor.display_name),
            avatar_url: actor.avatar_url.clone(),
        }
    }
}

/// Colour of an in-band notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeColour {
    Neutral,
    Error,
}

/// Embed posted in place of content that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub description: String,
    pub footer: Option<String>,
    pub colour: NoticeColour,
}

const WEBHOOK_USERNAME_MAX: usize = 80;

/// Webhook usernames may not contain "discord" or "clyde" and are limited
/// to 80 characters.
pub fn sanitize_username(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name.trim();

    while !rest.is_empty() {
        let lower = rest.to_ascii_lowercase();
        if lower.starts_with("discord") {
            // Zero-width space after the first letter.
            out.push_str(&rest[..1]);
            out.push('\u{200B}');
            out.push_str(&rest[1.."discord".len()]);
            rest = &rest["discord".len()..];
        } else if lower.starts_with("clyde") {
            // Cyrillic lookalike for the trailing "e".
            out.push_str(&rest[.."clyd".len()]);
            out.push(if rest.as_bytes()[4] == b'E' { '\u{0415}' } else { '\u{0435}' });
            rest = &rest["clyde".len()..];
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    let out: String = out.chars().take(WEBHOOK_USERNAME_MAX).collect();
    if out.trim().is_empty() {
        "Unknown".to_string()
    } else {
        out
    }
}

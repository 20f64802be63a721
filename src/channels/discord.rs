//! Discord collaborators: message store over the REST API and the duck pond
//! webhook as the relay destination.
//!
//! Both are connected explicitly before the gateway handler is registered,
//! so a missing webhook or a bad token fails startup instead of surfacing on
//! the first relay.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::all as discord;
use serenity::utils::{ContentSafeOptions, content_safe};
use tracing::{debug, info};

use crate::channels::{MessageStore, ProxyChannel};
use crate::error::{ChannelError, RelayError};
use crate::pond::emoji::EmojiMatcher;
use crate::pond::model::{
    Actor, Attachment, ChannelId, EmojiValue, GuildId, Message, MessageId, Notice, NoticeColour,
    ProxyIdentity, UserId, WebhookId,
};

/// Page size for reaction user listings (Discord's maximum).
const REACTION_PAGE: u8 = 100;

const CHANNEL_NAME: &str = "discord";

// ── Conversions ─────────────────────────────────────────────────────

/// Map a Discord reaction emoji into the engine's emoji type.
pub fn emoji_value(reaction: &discord::ReactionType) -> Option<EmojiValue> {
    match reaction {
        discord::ReactionType::Custom { id, name, .. } => Some(EmojiValue::Custom {
            id: id.get(),
            name: name.clone(),
        }),
        discord::ReactionType::Unicode(s) => Some(EmojiValue::Symbol(s.clone())),
        _ => None,
    }
}

fn reaction_type(emoji: &EmojiValue) -> discord::ReactionType {
    match emoji {
        EmojiValue::Custom { id, name } => discord::ReactionType::Custom {
            animated: false,
            id: discord::EmojiId::new(*id),
            name: name.clone(),
        },
        EmojiValue::Symbol(s) => discord::ReactionType::Unicode(s.clone()),
    }
}

fn member_actor(member: &discord::Member) -> Actor {
    Actor {
        id: member.user.id.get(),
        display_name: member.display_name().to_string(),
        avatar_url: Some(member.face()),
        roles: Some(member.roles.iter().map(|r| r.get()).collect()),
        is_bot: member.user.bot,
    }
}

fn user_actor(user: &discord::User) -> Actor {
    Actor {
        id: user.id.get(),
        display_name: user.display_name().to_string(),
        avatar_url: Some(user.face()),
        roles: None,
        is_bot: user.bot,
    }
}

fn attachment(a: &discord::Attachment) -> Attachment {
    Attachment {
        id: a.id.get(),
        filename: a.filename.clone(),
        size: u64::from(a.size),
        url: a.url.clone(),
    }
}

/// Render user, role and channel mentions as readable text and defuse mass
/// mentions. Names come from `mentions` and whatever the gateway cache holds.
pub fn render_content(
    cache: &Arc<discord::Cache>,
    guild_id: Option<GuildId>,
    content: &str,
    mentions: &[discord::User],
) -> String {
    let mut options = ContentSafeOptions::default().show_discriminator(false);
    if let Some(guild_id) = guild_id {
        options = options.display_as_member_from(discord::GuildId::new(guild_id));
    }
    content_safe(cache, content, &options, mentions)
}

// ── Error classification ────────────────────────────────────────────

fn status_of(err: &serenity::Error) -> Option<u16> {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

/// Lookups: 404 means the entity is gone, anything else is transport.
fn lookup_error(
    status: Option<u16>,
    entity: &'static str,
    id: u64,
    err: impl std::fmt::Display,
) -> RelayError {
    match status {
        Some(404) => RelayError::not_found(entity, id),
        _ => RelayError::delivery(format!("fetch {entity}"), err),
    }
}

/// Member lookups: 404 means the user is not in the guild, which is an
/// answer. Anything else is a failed lookup.
fn member_lookup(status: Option<u16>, err: impl std::fmt::Display) -> Result<(), RelayError> {
    match status {
        Some(404) => Ok(()),
        _ => Err(RelayError::delivery("fetch member", err)),
    }
}

/// Deliveries: 413 means the upload was too large, anything else is transport.
fn delivery_error(
    status: Option<u16>,
    operation: &str,
    filename: Option<&str>,
    err: impl std::fmt::Display,
) -> RelayError {
    match (status, filename) {
        (Some(413), Some(filename)) => RelayError::PayloadTooLarge {
            filename: filename.to_string(),
        },
        _ => RelayError::delivery(operation, err),
    }
}

/// Attachment downloads: 403 and 404 mean the bytes are no longer ours to get.
fn download_error(status: u16, filename: &str) -> RelayError {
    match status {
        403 | 404 => RelayError::authorization_lost(filename, format!("HTTP {status}")),
        _ => RelayError::delivery("download attachment", format!("HTTP {status} for {filename}")),
    }
}

// ── Message store ───────────────────────────────────────────────────

/// Reads messages and members through the Discord REST API.
pub struct DiscordStore {
    http: Arc<discord::Http>,
    cache: OnceLock<Arc<discord::Cache>>,
    client: reqwest::Client,
    self_id: UserId,
}

impl DiscordStore {
    /// Resolve the bot's own identity. Fails if the token is rejected.
    pub async fn connect(http: Arc<discord::Http>) -> Result<Self, ChannelError> {
        let me = http
            .get_current_user()
            .await
            .map_err(|e| ChannelError::AuthFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        info!(bot_id = me.id.get(), bot_name = %me.name, "Discord store connected");

        Ok(Self {
            http,
            cache: OnceLock::new(),
            client: reqwest::Client::new(),
            self_id: me.id.get(),
        })
    }

    /// Hand over the gateway cache once the client is ready. Later calls are
    /// ignored.
    pub fn attach_cache(&self, cache: Arc<discord::Cache>) {
        if self.cache.set(cache).is_ok() {
            debug!("Gateway cache attached to Discord store");
        }
    }

    fn cache(&self) -> Arc<discord::Cache> {
        self.cache
            .get()
            .cloned()
            .unwrap_or_else(|| Arc::new(discord::Cache::new()))
    }

    /// Member with roles when the user is in the guild, plain user if not.
    async fn resolve(
        &self,
        guild_id: Option<GuildId>,
        user: &discord::User,
    ) -> Result<Actor, RelayError> {
        let Some(guild_id) = guild_id else {
            return Ok(user_actor(user));
        };
        match self
            .http
            .get_member(discord::GuildId::new(guild_id), user.id)
            .await
        {
            Ok(member) => Ok(member_actor(&member)),
            Err(e) => {
                member_lookup(status_of(&e), &e)?;
                debug!(user_id = user.id.get(), "User is not a guild member");
                Ok(user_actor(user))
            }
        }
    }

    /// Every user currently reacting with `reaction` on `message`.
    async fn reaction_users(
        &self,
        message: &discord::Message,
        reaction: &discord::ReactionType,
    ) -> Result<Vec<discord::User>, RelayError> {
        let mut users = Vec::new();
        let mut after: Option<discord::UserId> = None;

        loop {
            let page = message
                .reaction_users(&self.http, reaction.clone(), Some(REACTION_PAGE), after)
                .await
                .map_err(|e| lookup_error(status_of(&e), "message", message.id.get(), e))?;

            let len = page.len();
            after = page.last().map(|u| u.id);
            users.extend(page);

            if len < usize::from(REACTION_PAGE) {
                break;
            }
        }

        Ok(users)
    }
}

#[async_trait]
impl MessageStore for DiscordStore {
    fn self_id(&self) -> UserId {
        self.self_id
    }

    async fn fetch_message(
        &self,
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
        message_id: MessageId,
        matcher: &EmojiMatcher,
    ) -> Result<Message, RelayError> {
        let raw = self
            .http
            .get_message(
                discord::ChannelId::new(channel_id),
                discord::MessageId::new(message_id),
            )
            .await
            .map_err(|e| lookup_error(status_of(&e), "message", message_id, e))?;

        // One member lookup per distinct user for this evaluation.
        let mut seen: HashMap<UserId, Actor> = HashMap::new();

        let mut reactions = Vec::with_capacity(raw.reactions.len());
        for reaction in &raw.reactions {
            let Some(emoji) = emoji_value(&reaction.reaction_type) else {
                continue;
            };
            if !matcher.is_relevant(&emoji) {
                continue;
            }

            let mut reactors = Vec::new();
            for user in self.reaction_users(&raw, &reaction.reaction_type).await? {
                let actor = match seen.get(&user.id.get()) {
                    Some(actor) => actor.clone(),
                    None => {
                        let actor = self.resolve(guild_id, &user).await?;
                        seen.insert(actor.id, actor.clone());
                        actor
                    }
                };
                reactors.push(actor);
            }
            reactions.push(crate::pond::model::Reaction::new(emoji, reactors));
        }

        let author = self.resolve(guild_id, &raw.author).await?;

        Ok(Message {
            id: raw.id.get(),
            channel_id: raw.channel_id.get(),
            guild_id,
            author,
            content: render_content(&self.cache(), guild_id, &raw.content, &raw.mentions),
            attachments: raw.attachments.iter().map(attachment).collect(),
            reactions,
        })
    }

    async fn fetch_actor(
        &self,
        guild_id: Option<GuildId>,
        user_id: UserId,
    ) -> Result<Actor, RelayError> {
        let user_id = discord::UserId::new(user_id);

        if let Some(guild_id) = guild_id {
            match self
                .http
                .get_member(discord::GuildId::new(guild_id), user_id)
                .await
            {
                Ok(member) => return Ok(member_actor(&member)),
                Err(e) => member_lookup(status_of(&e), &e)?,
            }
        }

        self.http
            .get_user(user_id)
            .await
            .map(|user| user_actor(&user))
            .map_err(|e| lookup_error(status_of(&e), "user", user_id.get(), e))
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &EmojiValue,
    ) -> Result<(), RelayError> {
        self.http
            .create_reaction(
                discord::ChannelId::new(channel_id),
                discord::MessageId::new(message_id),
                &reaction_type(emoji),
            )
            .await
            .map_err(|e| delivery_error(status_of(&e), "add reaction", None, e))
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, RelayError> {
        let resp = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| RelayError::delivery("download attachment", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(download_error(status.as_u16(), &attachment.filename));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RelayError::delivery("download attachment", e))?;
        Ok(bytes.to_vec())
    }
}

// ── Webhook destination ─────────────────────────────────────────────

/// The duck pond webhook. Posts under whatever identity it is handed.
pub struct WebhookProxy {
    http: Arc<discord::Http>,
    webhook: discord::Webhook,
}

impl WebhookProxy {
    /// Fetch the webhook. Fails if it does not exist or carries no token.
    pub async fn connect(
        http: Arc<discord::Http>,
        webhook_id: WebhookId,
    ) -> Result<Self, ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: CHANNEL_NAME.into(),
            reason,
        };

        if webhook_id == 0 {
            return Err(startup_failed("webhook id must be non-zero".into()));
        }

        let webhook = http
            .get_webhook(discord::WebhookId::new(webhook_id))
            .await
            .map_err(|e| startup_failed(format!("failed to fetch webhook {webhook_id}: {e}")))?;

        if webhook.token.is_none() {
            return Err(startup_failed(format!(
                "webhook {webhook_id} has no token; the bot needs Manage Webhooks"
            )));
        }

        info!(webhook_id, channel_id = ?webhook.channel_id, "Duck pond webhook connected");

        Ok(Self { http, webhook })
    }

    fn builder(identity: &ProxyIdentity) -> discord::ExecuteWebhook {
        let builder = discord::ExecuteWebhook::new()
            .username(identity.display_name.clone())
            .allowed_mentions(discord::CreateAllowedMentions::new());
        match &identity.avatar_url {
            Some(url) => builder.avatar_url(url.clone()),
            None => builder,
        }
    }

    async fn execute(
        &self,
        operation: &str,
        filename: Option<&str>,
        builder: discord::ExecuteWebhook,
    ) -> Result<(), RelayError> {
        self.webhook
            .execute(&*self.http, false, builder)
            .await
            .map(|_| ())
            .map_err(|e| delivery_error(status_of(&e), operation, filename, e))
    }
}

#[async_trait]
impl ProxyChannel for WebhookProxy {
    async fn send_text(&self, content: &str, identity: &ProxyIdentity) -> Result<(), RelayError> {
        self.execute("send text", None, Self::builder(identity).content(content))
            .await
    }

    async fn send_attachment(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        identity: &ProxyIdentity,
    ) -> Result<(), RelayError> {
        let file = discord::CreateAttachment::bytes(bytes, filename);
        self.execute(
            "send attachment",
            Some(filename),
            Self::builder(identity).add_file(file),
        )
        .await
    }

    async fn send_notice(&self, notice: &Notice, identity: &ProxyIdentity) -> Result<(), RelayError> {
        let mut embed = discord::CreateEmbed::new().description(notice.description.clone());
        if let NoticeColour::Error = notice.colour {
            embed = embed.colour(discord::Colour::RED);
        }
        if let Some(footer) = &notice.footer {
            embed = embed.footer(discord::CreateEmbedFooter::new(footer.clone()));
        }

        self.execute("send notice", None, Self::builder(identity).embed(embed))
            .await
    }
}

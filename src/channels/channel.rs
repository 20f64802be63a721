//! Platform collaborators the relay engine talks to.
//!
//! The engine never touches the gateway or HTTP directly; it goes through
//! these two traits so the same rules run against Discord or a test double.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::pond::emoji::EmojiMatcher;
use crate::pond::model::{
    Actor, Attachment, ChannelId, EmojiValue, GuildId, Message, MessageId, Notice, ProxyIdentity,
    UserId,
};

/// Read access to messages and members, plus reacting as the bot.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The bot's own user id.
    fn self_id(&self) -> UserId;

    /// Fetch a message with its live reactions and reactors.
    ///
    /// Only reactions `matcher` deems relevant are included. Returns
    /// `RelayError::NotFound` if the channel or message is gone.
    async fn fetch_message(
        &self,
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
        message_id: MessageId,
        matcher: &EmojiMatcher,
    ) -> Result<Message, RelayError>;

    /// Resolve a user, including guild roles when `guild_id` is given and the
    /// user is a member.
    async fn fetch_actor(
        &self,
        guild_id: Option<GuildId>,
        user_id: UserId,
    ) -> Result<Actor, RelayError>;

    /// React to a message as the bot.
    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &EmojiValue,
    ) -> Result<(), RelayError>;

    /// Download an attachment's bytes.
    ///
    /// Returns `RelayError::AuthorizationLost` when the file can no longer be
    /// retrieved.
    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, RelayError>;
}

/// The destination channel, posting under an impersonated identity.
#[async_trait]
pub trait ProxyChannel: Send + Sync {
    async fn send_text(&self, content: &str, identity: &ProxyIdentity) -> Result<(), RelayError>;

    async fn send_attachment(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        identity: &ProxyIdentity,
    ) -> Result<(), RelayError>;

    async fn send_notice(&self, notice: &Notice, identity: &ProxyIdentity) -> Result<(), RelayError>;
}

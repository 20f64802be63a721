//! Discord gateway handler.
//!
//! Turns reaction add/remove events into `ReactionEvent`s and hands them to
//! the relay engine. Each event is evaluated on its own task by serenity.

use std::sync::Arc;

use {
    serenity::{
        all::{Context, EventHandler, GatewayIntents, Reaction, Ready},
        async_trait,
    },
    tracing::{debug, info},
};

use crate::channels::discord::{DiscordStore, emoji_value};
use crate::pond::RelayEngine;
use crate::pond::model::{Polarity, ReactionEvent};

/// Handler for Discord gateway events.
pub struct DuckPondHandler {
    engine: Arc<RelayEngine>,
    store: Arc<DiscordStore>,
}

impl DuckPondHandler {
    /// `store` is the same store the engine reads through; it receives the
    /// gateway cache on `ready`.
    pub fn new(engine: Arc<RelayEngine>, store: Arc<DiscordStore>) -> Self {
        Self { engine, store }
    }

    async fn dispatch(&self, reaction: &Reaction, polarity: Polarity) {
        let Some(event) = reaction_event(reaction, polarity) else {
            return;
        };
        let outcome = self.engine.on_reaction(&event).await;
        debug!(message_id = event.message_id, ?polarity, ?outcome, "reaction evaluated");
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGE_REACTIONS
            | GatewayIntents::MESSAGE_CONTENT
    }
}

/// `None` for reactions without a user or with an emoji kind we do not model.
fn reaction_event(reaction: &Reaction, polarity: Polarity) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        guild_id: reaction.guild_id.map(|g| g.get()),
        channel_id: reaction.channel_id.get(),
        message_id: reaction.message_id.get(),
        actor_id: reaction.user_id?.get(),
        emoji: emoji_value(&reaction.emoji)?,
        polarity,
    })
}

#[async_trait]
impl EventHandler for DuckPondHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            threshold = self.engine.config().threshold,
            "duck pond bot ready"
        );
        self.store.attach_cache(Arc::clone(&ctx.cache));
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        self.dispatch(&reaction, Polarity::Added).await;
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        self.dispatch(&reaction, Polarity::Removed).await;
    }
}

//! Relay decision engine.
//!
//! Two entry points, one per reaction polarity, with `on_reaction` routing
//! gateway events between them. Neither trusts the event
//! payload beyond identifying the message: every decision is made against a
//! freshly fetched copy of the message, so redelivered or out-of-order events
//! converge on the same result.
//!
//! Relayed state is never stored. A message is relayed iff the bot's own
//! checkmark is on it.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::{MessageStore, ProxyChannel};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::pond::counter::DuckCounter;
use crate::pond::emoji::EmojiMatcher;
use crate::pond::locks::EvaluationLocks;
use crate::pond::marker::{apply_completion_marker, has_completion_marker};
use crate::pond::model::{Message, Polarity, ReactionEvent};
use crate::pond::policy::AuthorizationPolicy;
use crate::pond::relay::{RelayReport, Relayer};

/// Why an event was dropped without further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotTriggerEmoji,
    NotCompletionSymbol,
    ForeignGuild,
    MessageGone,
    /// The platform failed to answer; the next event re-evaluates.
    FetchFailed,
    ActorUnknown,
    ActorUntrusted,
    ActorIsBot,
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    BelowThreshold { count: usize },
    AlreadyRelayed,
    Relayed { report: RelayReport, marked: bool },
    MarkerRestored,
    MarkerLeftOff { count: usize },
    RestoreFailed,
}

pub struct RelayEngine {
    config: Arc<RelayConfig>,
    counter: DuckCounter,
    store: Arc<dyn MessageStore>,
    relayer: Relayer,
    locks: EvaluationLocks,
}

impl RelayEngine {
    /// Build the engine around an already-connected store and destination.
    pub fn new(
        config: Arc<RelayConfig>,
        store: Arc<dyn MessageStore>,
        proxy: Arc<dyn ProxyChannel>,
    ) -> Self {
        let counter = DuckCounter::new(
            AuthorizationPolicy::from_config(&config),
            EmojiMatcher::from_config(&config),
        );
        let relayer = Relayer::new(Arc::clone(&store), proxy, config.upload_limit);

        Self {
            config,
            counter,
            store,
            relayer,
            locks: EvaluationLocks::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn matcher(&self) -> &EmojiMatcher {
        self.counter.matcher()
    }

    /// Route a gateway reaction event by its polarity.
    pub async fn on_reaction(&self, event: &ReactionEvent) -> Outcome {
        match event.polarity {
            Polarity::Added => self.on_reaction_added(event).await,
            Polarity::Removed => self.on_reaction_removed(event).await,
        }
    }

    /// A reaction was added somewhere. Relays the message if this pushed it
    /// over the threshold and it has not been relayed yet.
    pub async fn on_reaction_added(&self, event: &ReactionEvent) -> Outcome {
        if !self.matcher().is_trigger_emoji(&event.emoji) {
            return Outcome::Ignored(IgnoreReason::NotTriggerEmoji);
        }
        if !self.in_home_guild(event) {
            return Outcome::Ignored(IgnoreReason::ForeignGuild);
        }

        let _guard = self.locks.acquire(event.message_id).await;

        let message = match self.fetch(event).await {
            Ok(message) => message,
            Err(reason) => return Outcome::Ignored(reason),
        };

        let actor = match self.store.fetch_actor(event.guild_id, event.actor_id).await {
            Ok(actor) => actor,
            Err(e) => {
                debug!(actor_id = event.actor_id, error = %e, "Could not resolve reacting member");
                return Outcome::Ignored(IgnoreReason::ActorUnknown);
            }
        };
        if !self.counter.policy().is_trusted(&actor) {
            return Outcome::Ignored(IgnoreReason::ActorUntrusted);
        }
        if actor.is_bot {
            return Outcome::Ignored(IgnoreReason::ActorIsBot);
        }

        if has_completion_marker(self.matcher(), &message, self.store.self_id()) {
            debug!(message_id = message.id, "Already in the duck pond");
            return Outcome::AlreadyRelayed;
        }

        let count = self.counter.count_trusted_triggers(&message);
        if count < self.config.threshold {
            debug!(
                message_id = message.id,
                count,
                threshold = self.config.threshold,
                "Not enough ducks yet"
            );
            return Outcome::BelowThreshold { count };
        }

        info!(
            message_id = message.id,
            channel_id = message.channel_id,
            count,
            "Duck threshold reached, relaying"
        );
        let report = self.relayer.relay(&message).await;

        // Marked even after a partial relay so retries do not post it twice.
        let marked = self.mark(&message).await;

        Outcome::Relayed { report, marked }
    }

    /// A reaction was removed somewhere. Puts the checkmark back if someone
    /// took it off a message that still has enough ducks.
    pub async fn on_reaction_removed(&self, event: &ReactionEvent) -> Outcome {
        if !self.matcher().is_completion_symbol(&event.emoji) {
            return Outcome::Ignored(IgnoreReason::NotCompletionSymbol);
        }
        if !self.in_home_guild(event) {
            return Outcome::Ignored(IgnoreReason::ForeignGuild);
        }

        let _guard = self.locks.acquire(event.message_id).await;

        let message = match self.fetch(event).await {
            Ok(message) => message,
            Err(reason) => return Outcome::Ignored(reason),
        };

        let count = self.counter.count_trusted_triggers(&message);
        if count < self.config.threshold {
            debug!(
                message_id = message.id,
                count,
                threshold = self.config.threshold,
                "Checkmark removed from message below threshold, leaving it off"
            );
            return Outcome::MarkerLeftOff { count };
        }

        warn!(
            message_id = message.id,
            remover = event.actor_id,
            "Checkmark removed from a duck pond message, restoring"
        );
        if self.mark(&message).await {
            Outcome::MarkerRestored
        } else {
            Outcome::RestoreFailed
        }
    }

    fn in_home_guild(&self, event: &ReactionEvent) -> bool {
        match self.config.guild_id {
            Some(home) => event.guild_id == Some(home),
            None => true,
        }
    }

    async fn fetch(&self, event: &ReactionEvent) -> Result<Message, IgnoreReason> {
        self.store
            .fetch_message(
                event.guild_id,
                event.channel_id,
                event.message_id,
                self.matcher(),
            )
            .await
            .map_err(|e| match e {
                RelayError::NotFound { .. } => {
                    debug!(message_id = event.message_id, error = %e, "Message vanished before evaluation");
                    IgnoreReason::MessageGone
                }
                _ => {
                    warn!(message_id = event.message_id, error = %e, "Failed to fetch message");
                    IgnoreReason::FetchFailed
                }
            })
    }

    async fn mark(&self, message: &Message) -> bool {
        match apply_completion_marker(self.store.as_ref(), self.matcher(), message).await {
            Ok(()) => true,
            Err(e) => {
                error!(message_id = message.id, error = %e, "Failed to add completion checkmark");
                false
            }
        }
    }
}

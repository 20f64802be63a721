//! Duck and checkmark recognition.

use std::collections::HashSet;

use crate::config::{COMPLETION_SYMBOL, DUCK_SYMBOL, RelayConfig};
use crate::pond::model::{EmojiId, EmojiValue};

/// Classifies reaction emoji for the relay engine.
#[derive(Debug, Clone)]
pub struct EmojiMatcher {
    custom_ids: HashSet<EmojiId>,
}

impl EmojiMatcher {
    pub fn new(custom_ids: impl IntoIterator<Item = EmojiId>) -> Self {
        Self {
            custom_ids: custom_ids.into_iter().collect(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.custom_emojis.iter().copied())
    }

    /// A configured custom duck, or the plain duck symbol.
    pub fn is_trigger_emoji(&self, emoji: &EmojiValue) -> bool {
        match emoji {
            EmojiValue::Custom { id, .. } => self.custom_ids.contains(id),
            EmojiValue::Symbol(s) => s == DUCK_SYMBOL,
        }
    }

    pub fn is_completion_symbol(&self, emoji: &EmojiValue) -> bool {
        match emoji {
            EmojiValue::Custom { .. } => false,
            EmojiValue::Symbol(s) => s == COMPLETION_SYMBOL,
        }
    }

    /// Whether the engine ever looks at reactors of `emoji`.
    pub fn is_relevant(&self, emoji: &EmojiValue) -> bool {
        self.is_trigger_emoji(emoji) || self.is_completion_symbol(emoji)
    }

    /// The reaction the bot applies once a message has been relayed.
    pub fn completion_marker(&self) -> EmojiValue {
        EmojiValue::symbol(COMPLETION_SYMBOL)
    }
}

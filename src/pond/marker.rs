//! The completion checkmark.
//!
//! A message counts as relayed when the bot itself reacted with the
//! completion symbol. Checkmarks from anyone else are ignored.

use crate::channels::MessageStore;
use crate::error::RelayError;
use crate::pond::emoji::EmojiMatcher;
use crate::pond::model::{Message, UserId};

pub fn has_completion_marker(matcher: &EmojiMatcher, message: &Message, self_id: UserId) -> bool {
    message
        .reactors_of(&matcher.completion_marker())
        .iter()
        .any(|actor| actor.id == self_id)
}

/// React with the completion symbol as the bot. Re-applying an existing
/// reaction is a no-op on the platform.
pub async fn apply_completion_marker(
    store: &dyn MessageStore,
    matcher: &EmojiMatcher,
    message: &Message,
) -> Result<(), RelayError> {
    store
        .add_reaction(message.channel_id, message.id, &matcher.completion_marker())
        .await
}

//! Duck counting.

use std::collections::HashSet;

use crate::pond::emoji::EmojiMatcher;
use crate::pond::model::{Message, UserId};
use crate::pond::policy::AuthorizationPolicy;

/// Counts distinct trusted reactors across every duck emoji on a message.
#[derive(Debug, Clone)]
pub struct DuckCounter {
    policy: AuthorizationPolicy,
    matcher: EmojiMatcher,
}

impl DuckCounter {
    pub fn new(policy: AuthorizationPolicy, matcher: EmojiMatcher) -> Self {
        Self { policy, matcher }
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    pub fn matcher(&self) -> &EmojiMatcher {
        &self.matcher
    }

    /// Number of distinct trusted actors reacting with any duck. A staffer
    /// using several duck variants counts once.
    pub fn count_trusted_triggers(&self, message: &Message) -> usize {
        let mut counted: HashSet<UserId> = HashSet::new();

        for reaction in &message.reactions {
            if !self.matcher.is_trigger_emoji(&reaction.emoji) {
                continue;
            }
            counted.extend(
                reaction
                    .reactors
                    .iter()
                    .filter(|actor| self.policy.is_trusted(actor))
                    .map(|actor| actor.id),
            );
        }

        counted.len()
    }
}

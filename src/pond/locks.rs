//! Per-message evaluation locks.
//!
//! Gateway events are handled on separate tasks, so two reactions on the same
//! message can be evaluated at once. Without serialization both could see
//! "no checkmark yet" and relay twice. Holding one of these guards for the
//! whole fetch-count-relay-mark sequence closes that window; evaluations of
//! different messages never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::pond::model::MessageId;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct EvaluationLocks {
    // Never held across an await.
    slots: Mutex<HashMap<MessageId, Slot>>,
}

impl EvaluationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive evaluation rights on `message_id`.
    pub async fn acquire(&self, message_id: MessageId) -> EvaluationGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(message_id).or_default())
        };
        let guard = slot.lock_owned().await;

        EvaluationGuard {
            locks: self,
            message_id,
            guard: Some(guard),
        }
    }

    /// Number of messages currently being evaluated or waited on.
    #[cfg(test)]
    fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Releases the message on drop and forgets its slot once nobody else holds
/// or awaits it.
pub struct EvaluationGuard<'a> {
    locks: &'a EvaluationLocks,
    message_id: MessageId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if slots
            .get(&self.message_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.message_id);
        }
    }
}

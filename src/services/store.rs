use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;

use crate::models::{Conversation, Turn, TurnPatch};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown conversation {uuid}")]
    UnknownConversation { uuid: String },

    #[error("turn index {index} out of bounds for conversation {uuid} (length {len})")]
    OutOfBounds {
        uuid: String,
        index: usize,
        len: usize,
    },
}

struct ConversationEntry {
    meta: Conversation,
    turns: Vec<Turn>,
}

/// Owns every conversation in the session: per-uuid metadata plus the
/// ordered turn sequence. Indices are assigned by append order and stay
/// stable for the life of the turn; mutation happens only through the
/// operations below, one at a time, driven by the single owning loop.
/// Writes to one `(uuid, index)` must come from a single owner while the
/// turn is open; the store itself takes no locks.
pub struct ConversationStore {
    conversations: HashMap<String, ConversationEntry>,
    using_context: bool,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
            using_context: true,
        }
    }

    /// The turn at `index`, or `None` when the conversation or index does
    /// not exist yet. Absence is an ordinary answer here, not an error.
    pub fn get_turn(&self, uuid: &str, index: usize) -> Option<&Turn> {
        self.conversations.get(uuid)?.turns.get(index)
    }

    /// Append `turn` to the conversation, creating the conversation on
    /// first reference. Returns the index the turn was assigned, which is
    /// always the sequence length before the append.
    pub fn append_turn(&mut self, uuid: &str, turn: Turn) -> usize {
        let entry = self
            .conversations
            .entry(uuid.to_string())
            .or_insert_with(|| ConversationEntry {
                meta: Conversation::new(uuid),
                turns: Vec::new(),
            });
        entry.turns.push(turn);
        entry.meta.updated_at = Utc::now();
        entry.turns.len() - 1
    }

    /// Overwrite the turn at `index` entirely. Writing past the end of the
    /// sequence is a caller bug (a desynced stream owner, usually) and comes
    /// back as an error instead of growing the sequence.
    pub fn replace_turn(&mut self, uuid: &str, index: usize, turn: Turn) -> Result<(), StoreError> {
        let entry = self.entry_mut(uuid)?;
        let len = entry.turns.len();
        let slot = entry
            .turns
            .get_mut(index)
            .ok_or_else(|| StoreError::OutOfBounds {
                uuid: uuid.to_string(),
                index,
                len,
            })?;
        *slot = turn;
        entry.meta.updated_at = Utc::now();
        Ok(())
    }

    /// Merge the fields present in `patch` into the turn at `index`,
    /// leaving the rest of the turn untouched.
    ///
    /// The merge replaces fields, it does not concatenate them: a streaming
    /// caller updating `content` passes the **full accumulated string** on
    /// every call, never the newly arrived fragment. Passing fragments here
    /// is the classic way to end up with duplicated text in the transcript.
    pub fn merge_turn(
        &mut self,
        uuid: &str,
        index: usize,
        patch: TurnPatch,
    ) -> Result<(), StoreError> {
        let entry = self.entry_mut(uuid)?;
        let len = entry.turns.len();
        let slot = entry
            .turns
            .get_mut(index)
            .ok_or_else(|| StoreError::OutOfBounds {
                uuid: uuid.to_string(),
                index,
                len,
            })?;
        slot.apply(patch);
        entry.meta.updated_at = Utc::now();
        Ok(())
    }

    /// All turns of a conversation in order; empty for an unknown uuid.
    pub fn turns(&self, uuid: &str) -> &[Turn] {
        self.conversations
            .get(uuid)
            .map(|entry| entry.turns.as_slice())
            .unwrap_or(&[])
    }

    pub fn turn_count(&self, uuid: &str) -> usize {
        self.turns(uuid).len()
    }

    pub fn get_conversation(&self, uuid: &str) -> Option<&Conversation> {
        self.conversations.get(uuid).map(|entry| &entry.meta)
    }

    /// Conversation metadata, most recently updated first.
    pub fn list_conversations(&self) -> Vec<&Conversation> {
        let mut conversations: Vec<&Conversation> =
            self.conversations.values().map(|entry| &entry.meta).collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    pub fn set_title(&mut self, uuid: &str, title: impl Into<String>) -> Result<(), StoreError> {
        let entry = self.entry_mut(uuid)?;
        entry.meta.title = title.into();
        entry.meta.updated_at = Utc::now();
        Ok(())
    }

    /// Explicit deletion; returns whether the conversation existed.
    pub fn remove_conversation(&mut self, uuid: &str) -> bool {
        self.conversations.remove(uuid).is_some()
    }

    pub fn using_context(&self) -> bool {
        self.using_context
    }

    pub fn set_using_context(&mut self, using_context: bool) {
        self.using_context = using_context;
    }

    fn entry_mut(&mut self, uuid: &str) -> Result<&mut ConversationEntry, StoreError> {
        self.conversations
            .get_mut(uuid)
            .ok_or_else(|| StoreError::UnknownConversation {
                uuid: uuid.to_string(),
            })
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a turn. A streaming reply moves Pending -> Streaming ->
/// Complete (or Errored); the index it occupies never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnStatus {
    Pending,
    Streaming,
    Complete,
    Errored,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnStatus::Complete | TurnStatus::Errored)
    }
}

/// One exchange unit in a conversation, addressed by its stable index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub status: TurnStatus,
    pub error: Option<String>,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl Turn {
    /// A finished user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: TurnStatus::Complete,
            error: None,
            model: None,
            tokens_in: None,
            tokens_out: None,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    /// An assistant turn awaiting its first streamed content.
    pub fn assistant_pending() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            status: TurnStatus::Pending,
            error: None,
            model: None,
            tokens_in: None,
            tokens_out: None,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Overwrite the fields present in `patch`, leaving the rest untouched.
    /// Role and creation time are fixed at append; changing them takes a
    /// full replace.
    pub fn apply(&mut self, patch: TurnPatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(tokens_in) = patch.tokens_in {
            self.tokens_in = Some(tokens_in);
        }
        if let Some(tokens_out) = patch.tokens_out {
            self.tokens_out = Some(tokens_out);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = Some(metadata);
        }
    }
}

/// Partial update for [`Turn::apply`]: `None` fields are left untouched.
///
/// `content` carries the full replacement string, not a fragment to append;
/// see [`crate::services::store::ConversationStore::merge_turn`].
#[derive(Debug, Clone, Default)]
pub struct TurnPatch {
    pub content: Option<String>,
    pub status: Option<TurnStatus>,
    pub error: Option<String>,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl TurnPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn status(status: TurnStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TurnStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tokens(mut self, tokens_in: Option<i64>, tokens_out: Option<i64>) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_only_present_fields() {
        let mut turn = Turn::assistant_pending();
        turn.content = "ab".to_string();

        turn.apply(TurnPatch::content("abc").with_status(TurnStatus::Streaming));

        assert_eq!(turn.content, "abc");
        assert_eq!(turn.status, TurnStatus::Streaming);
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.error.is_none());
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let mut turn = Turn::user("hello");
        let before = turn.clone();
        turn.apply(TurnPatch::default());
        assert_eq!(turn, before);
    }
}

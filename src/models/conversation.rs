use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "New Chat";

/// Metadata kept per conversation; the turn sequence itself lives in the
/// store alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub uuid: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(uuid: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uuid: uuid.into(),
            title: UNTITLED.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_untitled(&self) -> bool {
        self.title == UNTITLED
    }
}

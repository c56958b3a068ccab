pub mod chat;
pub mod context;
pub mod markdown;
pub mod store;

pub use context::{ContextController, ContextNotice, Notifier};
pub use store::ConversationStore;

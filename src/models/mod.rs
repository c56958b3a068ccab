pub mod conversation;
pub mod turn;

pub use conversation::Conversation;
pub use turn::{Role, Turn, TurnPatch, TurnStatus};

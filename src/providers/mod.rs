pub mod scripted;
pub mod traits;
pub mod types;

pub use scripted::ScriptedTransport;
pub use traits::ChatTransport;
pub use types::{ChatMessage, ChatRequest, StreamEvent};

pub mod copy;
pub mod follow;
pub mod surface;
pub mod transcript;

pub use copy::{CopyCodeController, SystemClipboard};
pub use follow::FollowController;
pub use transcript::TranscriptView;

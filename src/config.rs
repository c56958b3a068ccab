use std::time::Duration;

/// Name shown in the banner and used for log targets.
pub const APP_NAME: &str = "banter";

/// Model identity reported by the bundled transport.
pub const DEFAULT_MODEL: &str = "banter-demo-1";

/// Rows of transcript shown per draw.
pub const VIEWPORT_ROWS: usize = 24;

/// Pacing between streamed tokens from the bundled transport.
pub const TOKEN_DELAY: Duration = Duration::from_millis(25);

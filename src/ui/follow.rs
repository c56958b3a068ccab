use std::sync::Arc;

use crate::ui::surface::ScrollSurface;

/// Near-bottom distance, in rows, inside which the transcript keeps
/// following newly streamed content.
pub const FOLLOW_THRESHOLD: f64 = 100.0;

/// Keeps the transcript pinned to the newest content without fighting a
/// reader who has scrolled back up.
///
/// Starts unbound; every operation is a no-op until [`bind`](Self::bind)
/// attaches a surface. Each operation waits for one layout pass before
/// reading geometry, so heights include content appended just before the
/// call.
pub struct FollowController {
    surface: Option<Arc<dyn ScrollSurface>>,
}

impl FollowController {
    pub fn new() -> Self {
        Self { surface: None }
    }

    pub fn bind(&mut self, surface: Arc<dyn ScrollSurface>) {
        self.surface = Some(surface);
    }

    /// Jump to the newest content unconditionally.
    pub async fn scroll_to_bottom(&self) {
        let Some(surface) = &self.surface else {
            return;
        };
        surface.next_frame().await;
        surface.set_scroll_top(surface.content_height());
    }

    /// Jump back to the oldest content.
    pub async fn scroll_to_top(&self) {
        let Some(surface) = &self.surface else {
            return;
        };
        surface.next_frame().await;
        surface.set_scroll_top(0.0);
    }

    /// Re-anchor to the bottom only when the reader is already near it.
    pub async fn scroll_to_bottom_if_near_bottom(&self) {
        let Some(surface) = &self.surface else {
            return;
        };
        surface.next_frame().await;
        let distance =
            surface.content_height() - surface.scroll_top() - surface.viewport_height();
        if distance <= FOLLOW_THRESHOLD {
            surface.set_scroll_top(surface.content_height());
        }
    }
}

impl Default for FollowController {
    fn default() -> Self {
        Self::new()
    }
}

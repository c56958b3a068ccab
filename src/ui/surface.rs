use async_trait::async_trait;

/// Scrollable region of the transcript, measured in rendered rows.
///
/// `scroll_top` is the offset of the first visible row from the top of the
/// content. Implementations clamp writes to the valid range, so callers may
/// pass `content_height` to mean "all the way down".
#[async_trait]
pub trait ScrollSurface: Send + Sync {
    fn scroll_top(&self) -> f64;
    fn content_height(&self) -> f64;
    fn viewport_height(&self) -> f64;
    fn set_scroll_top(&self, offset: f64);

    /// Resolves after the surface has laid out once more, so geometry read
    /// afterwards reflects content appended before the call.
    async fn next_frame(&self);
}

/// A code block in the rendered transcript, addressable for copying.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlockRef {
    pub id: String,
    pub code: String,
}

/// Read side of a rendered transcript.
pub trait RenderedView {
    fn code_blocks(&self) -> Vec<CodeBlockRef>;
}

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{Role, Turn, TurnStatus};
use crate::services::markdown::{parse_markdown, MessageBlock};
use crate::ui::surface::{CodeBlockRef, RenderedView, ScrollSurface};

/// Terminal rendering of a conversation, one row per line of laid-out text.
///
/// Content changes are staged with [`set_turns`](Self::set_turns) and take
/// effect on the next frame, the way a retained-mode toolkit applies state
/// in its layout pass. Geometry reads between the two see the old layout.
pub struct TranscriptView {
    inner: Mutex<ViewState>,
    frames: AtomicU64,
}

struct ViewState {
    lines: Vec<String>,
    code_blocks: Vec<CodeBlockRef>,
    scroll_top: f64,
    viewport_rows: f64,
    pending: Option<Vec<Turn>>,
}

impl TranscriptView {
    pub fn new(viewport_rows: usize) -> Self {
        Self {
            inner: Mutex::new(ViewState {
                lines: Vec::new(),
                code_blocks: Vec::new(),
                scroll_top: 0.0,
                viewport_rows: viewport_rows as f64,
                pending: None,
            }),
            frames: AtomicU64::new(0),
        }
    }

    /// Stage a new transcript; the layout is rebuilt on the next frame.
    pub fn set_turns(&self, turns: &[Turn]) {
        self.inner.lock().unwrap().pending = Some(turns.to_vec());
    }

    #[cfg(test)]
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Write the visible window of the transcript.
    pub fn draw(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let state = self.inner.lock().unwrap();
        let top = state.scroll_top as usize;
        let bottom = (top + state.viewport_rows as usize).min(state.lines.len());
        for line in &state.lines[top..bottom] {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}

impl ViewState {
    fn relayout(&mut self, turns: &[Turn]) {
        let (lines, code_blocks) = layout_turns(turns);
        self.lines = lines;
        self.code_blocks = code_blocks;
        let max = (self.lines.len() as f64 - self.viewport_rows).max(0.0);
        self.scroll_top = self.scroll_top.clamp(0.0, max);
    }
}

#[async_trait]
impl ScrollSurface for TranscriptView {
    fn scroll_top(&self) -> f64 {
        self.inner.lock().unwrap().scroll_top
    }

    fn content_height(&self) -> f64 {
        self.inner.lock().unwrap().lines.len() as f64
    }

    fn viewport_height(&self) -> f64 {
        self.inner.lock().unwrap().viewport_rows
    }

    fn set_scroll_top(&self, offset: f64) {
        let mut state = self.inner.lock().unwrap();
        let max = (state.lines.len() as f64 - state.viewport_rows).max(0.0);
        state.scroll_top = offset.clamp(0.0, max);
    }

    async fn next_frame(&self) {
        {
            let mut state = self.inner.lock().unwrap();
            if let Some(turns) = state.pending.take() {
                state.relayout(&turns);
            }
        }
        tokio::task::yield_now().await;
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

impl RenderedView for TranscriptView {
    fn code_blocks(&self) -> Vec<CodeBlockRef> {
        self.inner.lock().unwrap().code_blocks.clone()
    }
}

/// Lay turns out as terminal rows, numbering code blocks in transcript
/// order so their ids stay stable across re-renders of the same content.
fn layout_turns(turns: &[Turn]) -> (Vec<String>, Vec<CodeBlockRef>) {
    let mut lines = Vec::new();
    let mut code_blocks = Vec::new();

    for turn in turns {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(turn_header(turn));

        if turn.status == TurnStatus::Errored {
            let reason = turn.error.as_deref().unwrap_or("unknown error");
            lines.push(format!("error: {}", reason));
            continue;
        }
        if turn.content.is_empty() {
            lines.push("…".to_string());
            continue;
        }

        for block in parse_markdown(&turn.content) {
            match block {
                MessageBlock::Paragraph(text) => {
                    lines.extend(text.lines().map(str::to_string));
                }
                MessageBlock::CodeBlock { language, code } => {
                    let id = format!("code-{}", code_blocks.len());
                    match &language {
                        Some(lang) => lines.push(format!("```{} · {}", lang, id)),
                        None => lines.push(format!("``` · {}", id)),
                    }
                    lines.extend(code.lines().map(str::to_string));
                    lines.push("```".to_string());
                    code_blocks.push(CodeBlockRef { id, code });
                }
                MessageBlock::Heading { level, text } => {
                    lines.push(format!("{} {}", "#".repeat(level as usize), text));
                }
                MessageBlock::ListItem {
                    depth,
                    marker,
                    text,
                } => {
                    lines.push(format!("{}{} {}", "  ".repeat(depth), marker, text));
                }
                MessageBlock::Quote(text) => {
                    lines.extend(text.lines().map(|l| format!("> {}", l)));
                }
                MessageBlock::Rule => {
                    lines.push("────".to_string());
                }
            }
        }
    }

    (lines, code_blocks)
}

fn turn_header(turn: &Turn) -> String {
    match turn.role {
        Role::User => "[you]".to_string(),
        Role::Assistant => match &turn.model {
            Some(model) => format!("[assistant · {}]", model),
            None => "[assistant]".to_string(),
        },
    }
}

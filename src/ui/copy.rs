use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::ui::surface::{CodeBlockRef, RenderedView};

/// Puts text on the system clipboard. Returns whether the write took.
pub trait Clipboard: Send {
    fn set_text(&mut self, text: &str) -> bool;
}

/// Native clipboard backend with a command-line fallback.
///
/// Headless and Wayland sessions often lack a native backend; piping into
/// wl-copy and friends still works there.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> bool {
        match arboard::Clipboard::new() {
            Ok(mut clipboard) => {
                if clipboard.set_text(text).is_ok() {
                    return true;
                }
            }
            Err(e) => {
                tracing::debug!("Clipboard backend unavailable: {}", e);
            }
        }
        pipe_to_clipboard_command(text)
    }
}

fn pipe_to_clipboard_command(text: &str) -> bool {
    for (program, args) in clipboard_commands() {
        let spawned = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let Ok(mut child) = spawned else {
            continue;
        };
        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(text.as_bytes()).is_err() {
                let _ = child.kill();
                let _ = child.wait();
                continue;
            }
        }
        if matches!(child.wait(), Ok(status) if status.success()) {
            return true;
        }
    }
    false
}

#[cfg(target_os = "macos")]
fn clipboard_commands() -> &'static [(&'static str, &'static [&'static str])] {
    &[("pbcopy", &[])]
}

#[cfg(target_os = "windows")]
fn clipboard_commands() -> &'static [(&'static str, &'static [&'static str])] {
    &[("clip", &[])]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn clipboard_commands() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
        ("xsel", &["--clipboard", "--input"]),
    ]
}

/// Binds a copy action to every code block in the rendered transcript.
///
/// `rescan` rebuilds the binding table from scratch, so running it after
/// every render leaves exactly one binding per block no matter how often
/// the same block has been seen.
pub struct CopyCodeController {
    clipboard: Box<dyn Clipboard>,
    bindings: HashMap<String, String>,
}

impl CopyCodeController {
    pub fn new(clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            clipboard,
            bindings: HashMap::new(),
        }
    }

    /// Replace all bindings with the code blocks currently in the view.
    pub fn rescan(&mut self, view: &dyn RenderedView) {
        self.bindings.clear();
        for CodeBlockRef { id, code } in view.code_blocks() {
            self.bindings.insert(id, code);
        }
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Ids currently bound, sorted.
    pub fn bound_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Copy the block bound to `id`. Unknown ids and clipboard failures
    /// stay quiet; returns whether text reached the clipboard.
    pub fn activate(&mut self, id: &str) -> bool {
        let Some(code) = self.bindings.get(id) else {
            tracing::debug!("No code block bound to {}", id);
            return false;
        };
        let copied = self.clipboard.set_text(code);
        if !copied {
            tracing::debug!("Clipboard write failed for {}", id);
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct StubView {
        blocks: Vec<CodeBlockRef>,
    }

    impl RenderedView for StubView {
        fn code_blocks(&self) -> Vec<CodeBlockRef> {
            self.blocks.clone()
        }
    }

    struct RecordingClipboard {
        writes: Arc<Mutex<Vec<String>>>,
    }

    impl Clipboard for RecordingClipboard {
        fn set_text(&mut self, text: &str) -> bool {
            self.writes.lock().unwrap().push(text.to_string());
            true
        }
    }

    struct FailingClipboard;

    impl Clipboard for FailingClipboard {
        fn set_text(&mut self, _text: &str) -> bool {
            false
        }
    }

    fn block(id: &str, code: &str) -> CodeBlockRef {
        CodeBlockRef {
            id: id.to_string(),
            code: code.to_string(),
        }
    }

    #[test]
    fn test_rescan_binds_each_block_once() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut controller = CopyCodeController::new(Box::new(RecordingClipboard {
            writes: writes.clone(),
        }));
        let view = StubView {
            blocks: vec![block("code-0", "println!(\"hi\")"), block("code-1", "ls -la")],
        };

        controller.rescan(&view);
        controller.rescan(&view);
        assert_eq!(controller.binding_count(), 2);

        assert!(controller.activate("code-1"));
        let writes = writes.lock().unwrap();
        assert_eq!(writes.as_slice(), ["ls -la"]);
    }

    #[test]
    fn test_activate_unknown_id_is_quiet() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut controller = CopyCodeController::new(Box::new(RecordingClipboard {
            writes: writes.clone(),
        }));

        assert!(!controller.activate("code-0"));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clipboard_failure_is_quiet() {
        let mut controller = CopyCodeController::new(Box::new(FailingClipboard));
        let view = StubView {
            blocks: vec![block("code-0", "echo hi")],
        };

        controller.rescan(&view);
        assert!(!controller.activate("code-0"));
    }

    #[test]
    fn test_rescan_drops_stale_bindings() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut controller = CopyCodeController::new(Box::new(RecordingClipboard {
            writes: writes.clone(),
        }));

        controller.rescan(&StubView {
            blocks: vec![block("code-0", "old")],
        });
        controller.rescan(&StubView {
            blocks: vec![block("code-1", "new")],
        });

        assert!(!controller.activate("code-0"));
        assert!(controller.activate("code-1"));
        assert_eq!(writes.lock().unwrap().as_slice(), ["new"]);
    }
}

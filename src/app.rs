use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{APP_NAME, DEFAULT_MODEL, VIEWPORT_ROWS};
use crate::models::{Role, Turn, TurnPatch, TurnStatus};
use crate::providers::{ChatRequest, ChatTransport};
use crate::services::chat::{self, StreamParams, StreamUpdate};
use crate::services::{ContextController, ContextNotice, ConversationStore, Notifier};
use crate::ui::{CopyCodeController, FollowController, SystemClipboard, TranscriptView};

/// A slash command typed at the prompt.
#[derive(Debug, PartialEq)]
enum ShellCommand<'a> {
    New,
    List,
    Open(&'a str),
    Delete(&'a str),
    Context,
    Retry,
    Top,
    Bottom,
    Copy(&'a str),
    Help,
    Quit,
}

fn parse_command(input: &str) -> Option<ShellCommand<'_>> {
    let rest = input.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match (name, arg) {
        ("new", _) => Some(ShellCommand::New),
        ("list", _) => Some(ShellCommand::List),
        ("open", a) if !a.is_empty() => Some(ShellCommand::Open(a)),
        ("delete", a) if !a.is_empty() => Some(ShellCommand::Delete(a)),
        ("context", _) => Some(ShellCommand::Context),
        ("retry", _) => Some(ShellCommand::Retry),
        ("top", _) => Some(ShellCommand::Top),
        ("bottom", _) => Some(ShellCommand::Bottom),
        ("copy", a) if !a.is_empty() => Some(ShellCommand::Copy(a)),
        ("help", _) => Some(ShellCommand::Help),
        ("quit" | "exit", _) => Some(ShellCommand::Quit),
        _ => None,
    }
}

/// Prints context toggle notices on the terminal.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: ContextNotice) {
        match notice {
            ContextNotice::Enabled => {
                println!("Earlier turns are included with requests again.")
            }
            ContextNotice::Disabled => {
                println!("Earlier turns are no longer sent with requests.")
            }
        }
    }
}

/// Interactive shell around the conversation store, the scroll follower,
/// and the code copy bindings.
pub struct ChatShell {
    store: ConversationStore,
    context: ContextController,
    follow: FollowController,
    copy: CopyCodeController,
    view: Arc<TranscriptView>,
    transport: Arc<dyn ChatTransport>,
    active: String,
}

impl ChatShell {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        let view = Arc::new(TranscriptView::new(VIEWPORT_ROWS));
        let mut follow = FollowController::new();
        follow.bind(view.clone());

        Self {
            store: ConversationStore::new(),
            context: ContextController::new(Box::new(TerminalNotifier)),
            follow,
            copy: CopyCodeController::new(Box::new(SystemClipboard)),
            view,
            transport,
            active: Uuid::new_v4().to_string(),
        }
    }

    /// Read lines from stdin until EOF or `/quit`.
    pub async fn run(&mut self) -> Result<()> {
        println!("{APP_NAME} · chat with a scripted model. /help lists commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        prompt()?;
        while let Some(line) = lines.next_line().await? {
            let input = line.trim();
            if input.is_empty() {
                prompt()?;
                continue;
            }
            if input.starts_with('/') {
                match parse_command(input) {
                    Some(ShellCommand::Quit) => break,
                    Some(command) => self.handle_command(command).await?,
                    None => println!("Unknown or incomplete command (try /help)"),
                }
            } else {
                self.send_message(input).await?;
            }
            prompt()?;
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: ShellCommand<'_>) -> Result<()> {
        match command {
            ShellCommand::New => {
                self.active = Uuid::new_v4().to_string();
                self.refresh_view();
                println!("Started a new conversation.");
            }
            ShellCommand::List => {
                let conversations = self.store.list_conversations();
                if conversations.is_empty() {
                    println!("No conversations yet.");
                }
                for (position, conversation) in conversations.iter().enumerate() {
                    let marker = if conversation.uuid == self.active { "*" } else { " " };
                    println!(
                        "{marker} {}. {} ({} turns)  [{}]",
                        position + 1,
                        conversation.title,
                        self.store.turn_count(&conversation.uuid),
                        &conversation.uuid[..8]
                    );
                }
            }
            ShellCommand::Open(key) => match self.resolve_conversation(key) {
                Some(uuid) => {
                    self.active = uuid;
                    self.refresh_view();
                    self.follow.scroll_to_bottom().await;
                    self.redraw()?;
                    self.copy.rescan(self.view.as_ref());
                }
                None => println!("No conversation matches '{key}'."),
            },
            ShellCommand::Delete(key) => match self.resolve_conversation(key) {
                Some(uuid) => {
                    self.store.remove_conversation(&uuid);
                    println!("Deleted conversation.");
                    if uuid == self.active {
                        self.active = Uuid::new_v4().to_string();
                        self.refresh_view();
                    }
                }
                None => println!("No conversation matches '{key}'."),
            },
            ShellCommand::Context => {
                self.context.toggle(&mut self.store);
            }
            ShellCommand::Retry => self.retry_last().await?,
            ShellCommand::Top => {
                self.follow.scroll_to_top().await;
                self.redraw()?;
            }
            ShellCommand::Bottom => {
                self.follow.scroll_to_bottom().await;
                self.redraw()?;
            }
            ShellCommand::Copy(id) => self.copy_block(id),
            ShellCommand::Help => print_help(),
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    /// Append the user turn, stream the reply into a pending slot, then
    /// re-anchor the viewport and rebind copy actions.
    async fn send_message(&mut self, text: &str) -> Result<()> {
        let uuid = self.active.clone();

        self.store.append_turn(&uuid, Turn::user(text));
        let needs_title = self
            .store
            .get_conversation(&uuid)
            .map(|c| c.is_untitled())
            .unwrap_or(false);
        if needs_title {
            if let Err(e) = self.store.set_title(&uuid, chat::truncate_title(text)) {
                tracing::warn!("Failed to title conversation: {}", e);
            }
        }
        self.refresh_view();
        self.follow.scroll_to_bottom().await;

        let with_context = self.context.is_enabled(&self.store);
        let request = chat::build_request(DEFAULT_MODEL, self.store.turns(&uuid), with_context);
        let pending = Turn::assistant_pending().with_metadata(serde_json::json!({
            "model": DEFAULT_MODEL,
            "context": with_context,
        }));
        let index = self.store.append_turn(&uuid, pending);
        self.stream_into(request, uuid, index).await
    }

    /// Re-run the last reply: put a fresh pending turn in its slot and
    /// stream into it again.
    async fn retry_last(&mut self) -> Result<()> {
        let uuid = self.active.clone();
        let turns = self.store.turns(&uuid);
        let retryable = turns
            .last()
            .map(|t| t.role == Role::Assistant && t.status.is_terminal())
            .unwrap_or(false);
        if !retryable {
            println!("Nothing to retry.");
            return Ok(());
        }
        let index = turns.len() - 1;

        let with_context = self.context.is_enabled(&self.store);
        let request = chat::build_request(DEFAULT_MODEL, &turns[..index], with_context);
        let pending = Turn::assistant_pending().with_metadata(serde_json::json!({
            "model": DEFAULT_MODEL,
            "context": with_context,
        }));
        if let Err(e) = self.store.replace_turn(&uuid, index, pending) {
            tracing::error!("Retry failed: {}", e);
            return Ok(());
        }
        self.refresh_view();
        self.stream_into(request, uuid, index).await
    }

    /// Drive one streaming request into the turn at `index`, updating the
    /// transcript as text arrives.
    async fn stream_into(&mut self, request: ChatRequest, uuid: String, index: usize) -> Result<()> {
        // Ctrl-C stops the generation instead of the shell while a reply
        // is streaming.
        let cancel_token = CancellationToken::new();
        let canceller = cancel_token.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                canceller.cancel();
            }
        });

        let store = &mut self.store;
        let view = &self.view;
        let mut printed = 0usize;

        chat::run_streaming(
            self.transport.clone(),
            StreamParams {
                request,
                conversation: uuid.clone(),
                index,
            },
            cancel_token,
            |update| match update {
                StreamUpdate::Delta {
                    conversation,
                    index,
                    accumulated,
                } => {
                    let mut out = io::stdout();
                    let _ = out.write_all(accumulated[printed..].as_bytes());
                    let _ = out.flush();
                    printed = accumulated.len();

                    let patch =
                        TurnPatch::content(accumulated).with_status(TurnStatus::Streaming);
                    if let Err(e) = store.merge_turn(&conversation, index, patch) {
                        tracing::error!("Dropped stream delta: {}", e);
                    }
                    view.set_turns(store.turns(&conversation));
                }
                StreamUpdate::Completed {
                    conversation,
                    index,
                    full_content,
                    model,
                    tokens_in,
                    tokens_out,
                } => {
                    let patch = TurnPatch::content(full_content)
                        .with_status(TurnStatus::Complete)
                        .with_model(model)
                        .with_tokens(tokens_in, tokens_out);
                    if let Err(e) = store.merge_turn(&conversation, index, patch) {
                        tracing::error!("Dropped stream completion: {}", e);
                    }
                    view.set_turns(store.turns(&conversation));
                }
                StreamUpdate::Failed {
                    conversation,
                    index,
                    error,
                } => {
                    println!("\n[{error}]");
                    let patch = TurnPatch::status(TurnStatus::Errored).with_error(error);
                    if let Err(e) = store.merge_turn(&conversation, index, patch) {
                        tracing::error!("Dropped stream failure: {}", e);
                    }
                    view.set_turns(store.turns(&conversation));
                }
            },
        )
        .await;
        ctrl_c.abort();
        println!();

        self.follow.scroll_to_bottom_if_near_bottom().await;
        self.copy.rescan(self.view.as_ref());

        if let Some(turn) = self.store.get_turn(&uuid, index) {
            if let (Some(model), Some(tokens_in), Some(tokens_out)) =
                (&turn.model, turn.tokens_in, turn.tokens_out)
            {
                println!("({model}: {tokens_in} in / {tokens_out} out)");
            }
        }
        match self.copy.binding_count() {
            0 => {}
            1 => println!("(1 code block on screen; /copy 0 copies it)"),
            n => println!("({n} code blocks on screen; /copy <n> copies one)"),
        }
        Ok(())
    }

    fn copy_block(&mut self, id: &str) {
        let id = match id.parse::<usize>() {
            Ok(n) => format!("code-{n}"),
            Err(_) => id.to_string(),
        };
        if !self.copy.bound_ids().contains(&id.as_str()) {
            let bound = self.copy.bound_ids().join(", ");
            if bound.is_empty() {
                println!("No code blocks on screen to copy.");
            } else {
                println!("Nothing bound to '{id}'. Available: {bound}");
            }
            return;
        }
        if self.copy.activate(&id) {
            println!("Copied {id}.");
        }
    }

    fn resolve_conversation(&self, key: &str) -> Option<String> {
        let conversations = self.store.list_conversations();
        if let Ok(position) = key.parse::<usize>() {
            if position >= 1 {
                if let Some(conversation) = conversations.get(position - 1) {
                    return Some(conversation.uuid.clone());
                }
            }
        }
        conversations
            .iter()
            .find(|c| c.uuid.starts_with(key))
            .map(|c| c.uuid.clone())
    }

    fn refresh_view(&self) {
        self.view.set_turns(self.store.turns(&self.active));
    }

    fn redraw(&self) -> Result<()> {
        let mut out = io::stdout();
        self.view.draw(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

fn prompt() -> io::Result<()> {
    let mut out = io::stdout();
    write!(out, "❯ ")?;
    out.flush()
}

fn print_help() {
    println!("Commands:");
    println!("  /new           start a new conversation");
    println!("  /list          list conversations, newest first");
    println!("  /open <n|id>   switch conversation by list position or id prefix");
    println!("  /delete <n|id> delete a conversation");
    println!("  /context       toggle sending earlier turns with each request");
    println!("  /retry         regenerate the last reply");
    println!("  /top           scroll the transcript to the oldest content");
    println!("  /bottom        scroll the transcript to the newest content");
    println!("  /copy <n>      copy code block n from the transcript");
    println!("  /help          this list");
    println!("  /quit          leave");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedTransport;
    use std::time::Duration;

    fn shell() -> ChatShell {
        ChatShell::new(Arc::new(
            ScriptedTransport::new().with_token_delay(Duration::ZERO),
        ))
    }

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(parse_command("/new"), Some(ShellCommand::New));
        assert_eq!(parse_command("/open 2"), Some(ShellCommand::Open("2")));
        assert_eq!(
            parse_command("/copy code-1"),
            Some(ShellCommand::Copy("code-1"))
        );
        assert_eq!(parse_command("/retry"), Some(ShellCommand::Retry));
        assert_eq!(parse_command("/quit"), Some(ShellCommand::Quit));
        assert_eq!(parse_command("/open"), None);
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/bogus"), None);
    }

    #[tokio::test]
    async fn test_send_message_completes_the_reply_turn() {
        let mut shell = shell();
        shell.send_message("hello there").await.unwrap();

        let turns = shell.store.turns(&shell.active);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].status, TurnStatus::Complete);
        assert!(turns[1].content.contains("```sh"));
        assert_eq!(shell.copy.binding_count(), 1);
    }

    #[tokio::test]
    async fn test_first_message_titles_the_conversation() {
        let mut shell = shell();
        shell.send_message("name this chat").await.unwrap();

        let conversation = shell.store.get_conversation(&shell.active).unwrap();
        assert_eq!(conversation.title, "name this chat");
    }

    #[tokio::test]
    async fn test_context_toggle_changes_request_payload() {
        let mut shell = shell();
        shell.send_message("first question").await.unwrap();
        shell.handle_command(ShellCommand::Context).await.unwrap();
        shell.send_message("second question").await.unwrap();

        let turns = shell.store.turns(&shell.active);
        let reply = &turns[3];
        assert!(reply.content.contains("Starting fresh"));
    }

    #[tokio::test]
    async fn test_retry_streams_into_the_same_slot() {
        let mut shell = shell();
        shell.send_message("first question").await.unwrap();
        shell.handle_command(ShellCommand::Retry).await.unwrap();

        let turns = shell.store.turns(&shell.active);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].status, TurnStatus::Complete);
        assert!(turns[1].content.contains("first question"));
    }

    #[tokio::test]
    async fn test_retry_without_a_reply_is_refused() {
        let mut shell = shell();
        shell.handle_command(ShellCommand::Retry).await.unwrap();
        assert_eq!(shell.store.turn_count(&shell.active), 0);
    }

    #[tokio::test]
    async fn test_delete_forgets_the_conversation() {
        let mut shell = shell();
        shell.send_message("hello").await.unwrap();
        let before = shell.active.clone();

        shell
            .handle_command(ShellCommand::Delete("1"))
            .await
            .unwrap();

        assert!(shell.store.get_conversation(&before).is_none());
        assert_ne!(shell.active, before);
    }
}

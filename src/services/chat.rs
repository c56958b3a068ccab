use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::models::{Role, Turn, TurnStatus};
use crate::providers::{ChatMessage, ChatRequest, ChatTransport, StreamEvent};

/// Parameters needed to dispatch a streaming request against a transcript slot.
pub struct StreamParams {
    pub request: ChatRequest,
    pub conversation: String,
    pub index: usize,
}

/// Progress from a streaming request: a partial update, completion, or error.
///
/// `Delta::accumulated` always carries the full text produced so far, so a
/// consumer folds it into the turn with a plain field replacement.
pub enum StreamUpdate {
    Delta {
        conversation: String,
        index: usize,
        accumulated: String,
    },
    Completed {
        conversation: String,
        index: usize,
        full_content: String,
        model: String,
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
    },
    Failed {
        conversation: String,
        index: usize,
        error: String,
    },
}

/// Build a `ChatRequest` from the transcript, honoring the context flag.
///
/// With context on, every successfully completed turn before the prompt is
/// included; with context off only the newest user turn goes out.
pub fn build_request(model: &str, turns: &[Turn], using_context: bool) -> ChatRequest {
    let prompt_index = turns.iter().rposition(|t| t.role == Role::User);

    let messages = match prompt_index {
        Some(idx) if using_context => {
            let mut history = turns_to_chat_messages(
                turns[..idx]
                    .iter()
                    .filter(|t| t.status == TurnStatus::Complete),
            );
            history.push(ChatMessage {
                role: Role::User,
                content: turns[idx].content.clone(),
            });
            history
        }
        Some(idx) => vec![ChatMessage {
            role: Role::User,
            content: turns[idx].content.clone(),
        }],
        None => Vec::new(),
    };

    ChatRequest {
        model: model.to_string(),
        messages,
    }
}

/// Convert turns to `ChatMessage` payload entries.
pub fn turns_to_chat_messages<'a, I>(turns: I) -> Vec<ChatMessage>
where
    I: IntoIterator<Item = &'a Turn>,
{
    turns
        .into_iter()
        .map(|t| ChatMessage {
            role: t.role,
            content: t.content.clone(),
        })
        .collect()
}

/// Run a streaming request, folding tokens and reporting `StreamUpdate`s
/// through a callback.
///
/// Cancellation keeps whatever arrived: a non-empty accumulation completes,
/// an empty one fails with "Generation stopped".
pub async fn run_streaming<F>(
    transport: Arc<dyn ChatTransport>,
    params: StreamParams,
    cancel_token: CancellationToken,
    mut on_update: F,
) where
    F: FnMut(StreamUpdate) + Send,
{
    let (tx, mut rx) = tokio::sync::mpsc::channel::<StreamEvent>(64);

    let request = params.request;
    let conversation = params.conversation;
    let index = params.index;
    let model = request.model.clone();

    let _stream_handle = tokio::spawn(async move {
        if let Err(e) = transport.stream_message(request, tx.clone()).await {
            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
        }
    });

    let mut accumulated = String::new();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                if !accumulated.is_empty() {
                    on_update(StreamUpdate::Completed {
                        conversation,
                        index,
                        full_content: accumulated,
                        model,
                        tokens_in: None,
                        tokens_out: None,
                    });
                } else {
                    on_update(StreamUpdate::Failed {
                        conversation,
                        index,
                        error: "Generation stopped".to_string(),
                    });
                }
                return;
            }
            event = rx.recv() => {
                match event {
                    Some(StreamEvent::Token(token)) => {
                        accumulated.push_str(&token);
                        on_update(StreamUpdate::Delta {
                            conversation: conversation.clone(),
                            index,
                            accumulated: accumulated.clone(),
                        });
                    }
                    Some(StreamEvent::Done { tokens_in, tokens_out }) => {
                        on_update(StreamUpdate::Completed {
                            conversation,
                            index,
                            full_content: accumulated,
                            model,
                            tokens_in,
                            tokens_out,
                        });
                        return;
                    }
                    Some(StreamEvent::Error(error)) => {
                        on_update(StreamUpdate::Failed {
                            conversation,
                            index,
                            error,
                        });
                        return;
                    }
                    None => {
                        if !accumulated.is_empty() {
                            on_update(StreamUpdate::Completed {
                                conversation,
                                index,
                                full_content: accumulated,
                                model,
                                tokens_in: None,
                                tokens_out: None,
                            });
                        } else {
                            on_update(StreamUpdate::Failed {
                                conversation,
                                index,
                                error: "Stream ended unexpectedly".to_string(),
                            });
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Truncate text to a short title for conversations.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.len() > 50 {
        let boundary = first_line
            .char_indices()
            .take_while(|(i, _)| *i < 47)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(47);
        format!("{}...", &first_line[..boundary])
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::TransportError;
    use crate::providers::ScriptedTransport;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn complete_turn(role: Role, content: &str) -> Turn {
        let mut turn = match role {
            Role::User => Turn::user(content),
            Role::Assistant => Turn::assistant_pending(),
        };
        turn.content = content.to_string();
        turn.status = TurnStatus::Complete;
        turn
    }

    #[test]
    fn test_build_request_with_context_includes_history() {
        let turns = vec![
            complete_turn(Role::User, "first question"),
            complete_turn(Role::Assistant, "first answer"),
            Turn::user("second question"),
        ];

        let request = build_request("demo", &turns, true);
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, "first question");
        assert_eq!(request.messages[1].role, Role::Assistant);
        assert_eq!(request.messages[2].content, "second question");
    }

    #[test]
    fn test_build_request_without_context_sends_latest_only() {
        let turns = vec![
            complete_turn(Role::User, "first question"),
            complete_turn(Role::Assistant, "first answer"),
            Turn::user("second question"),
        ];

        let request = build_request("demo", &turns, false);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.messages[0].content, "second question");
    }

    #[test]
    fn test_build_request_skips_unfinished_turns() {
        let mut errored = Turn::assistant_pending();
        errored.status = TurnStatus::Errored;

        let turns = vec![
            complete_turn(Role::User, "first question"),
            errored,
            Turn::user("second question"),
        ];

        let request = build_request("demo", &turns, true);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "first question");
        assert_eq!(request.messages[1].content, "second question");
    }

    #[tokio::test]
    async fn test_run_streaming_grows_accumulated_text() {
        let transport: Arc<dyn ChatTransport> =
            Arc::new(ScriptedTransport::new().with_token_delay(Duration::ZERO));
        let params = StreamParams {
            request: build_request("demo", &[Turn::user("hello")], true),
            conversation: "c1".to_string(),
            index: 1,
        };

        let mut updates = Vec::new();
        run_streaming(transport, params, CancellationToken::new(), |u| {
            updates.push(u)
        })
        .await;

        let mut previous = String::new();
        let mut completed = None;
        for update in updates {
            match update {
                StreamUpdate::Delta { accumulated, index, .. } => {
                    assert_eq!(index, 1);
                    assert!(accumulated.starts_with(&previous));
                    assert!(accumulated.len() > previous.len());
                    previous = accumulated;
                }
                StreamUpdate::Completed { full_content, .. } => {
                    completed = Some(full_content);
                }
                StreamUpdate::Failed { error, .. } => panic!("unexpected failure: {error}"),
            }
        }
        assert_eq!(completed.as_deref(), Some(previous.as_str()));
    }

    struct StalledTransport {
        tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl ChatTransport for StalledTransport {
        async fn stream_message(
            &self,
            _request: ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), TransportError> {
            for token in &self.tokens {
                tx.send(StreamEvent::Token(token.to_string()))
                    .await
                    .map_err(|_| TransportError::ChannelClosed)?;
            }
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_before_tokens_fails_the_turn() {
        let transport: Arc<dyn ChatTransport> = Arc::new(StalledTransport { tokens: vec![] });
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let mut updates = Vec::new();
        run_streaming(
            transport,
            StreamParams {
                request: ChatRequest {
                    model: "demo".to_string(),
                    messages: Vec::new(),
                },
                conversation: "c1".to_string(),
                index: 0,
            },
            cancel_token,
            |u| updates.push(u),
        )
        .await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            StreamUpdate::Failed { error, .. } if error == "Generation stopped"
        ));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_text() {
        let transport: Arc<dyn ChatTransport> = Arc::new(StalledTransport {
            tokens: vec!["hello ", "world"],
        });
        let cancel_token = CancellationToken::new();
        let canceller = cancel_token.clone();

        let mut updates = Vec::new();
        run_streaming(
            transport,
            StreamParams {
                request: ChatRequest {
                    model: "demo".to_string(),
                    messages: Vec::new(),
                },
                conversation: "c1".to_string(),
                index: 0,
            },
            cancel_token,
            |u| {
                if let StreamUpdate::Delta { accumulated, .. } = &u {
                    if accumulated == "hello world" {
                        canceller.cancel();
                    }
                }
                updates.push(u);
            },
        )
        .await;

        assert!(matches!(
            updates.last(),
            Some(StreamUpdate::Completed { full_content, tokens_out: None, .. })
                if full_content == "hello world"
        ));
    }

    struct TruncatedTransport;

    #[async_trait]
    impl ChatTransport for TruncatedTransport {
        async fn stream_message(
            &self,
            _request: ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), TransportError> {
            tx.send(StreamEvent::Token("partial".to_string()))
                .await
                .map_err(|_| TransportError::ChannelClosed)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stream_closing_without_done_still_completes() {
        let transport: Arc<dyn ChatTransport> = Arc::new(TruncatedTransport);

        let mut updates = Vec::new();
        run_streaming(
            transport,
            StreamParams {
                request: ChatRequest {
                    model: "demo".to_string(),
                    messages: Vec::new(),
                },
                conversation: "c1".to_string(),
                index: 0,
            },
            CancellationToken::new(),
            |u| updates.push(u),
        )
        .await;

        assert!(matches!(
            updates.last(),
            Some(StreamUpdate::Completed { full_content, .. }) if full_content == "partial"
        ));
    }

    #[test]
    fn test_truncate_title_short_text() {
        assert_eq!(truncate_title("Hello"), "Hello");
    }

    #[test]
    fn test_truncate_title_long_text() {
        let long = "a".repeat(80);
        let title = truncate_title(&long);
        assert!(title.ends_with("..."));
        assert!(title.len() <= 50);
    }

    #[test]
    fn test_truncate_title_uses_first_line() {
        assert_eq!(truncate_title("line one\nline two"), "line one");
    }
}

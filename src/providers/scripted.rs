use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::ChatTransport;
use super::types::{ChatRequest, StreamEvent, TransportError};
use crate::models::Role;

/// In-process stand-in for a model endpoint: composes a deterministic
/// reply from the request and word-paces it down the channel, so the
/// streaming path behaves the same with or without a network.
pub struct ScriptedTransport {
    token_delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            token_delay: Duration::from_millis(25),
        }
    }

    /// Zero makes the stream immediate; tests use this.
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    fn compose_reply(request: &ChatRequest) -> String {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let prompt_line: String = last_user
            .lines()
            .next()
            .unwrap_or("")
            .replace('\'', "")
            .chars()
            .take(60)
            .collect();
        let prior = request.messages.len().saturating_sub(1);

        let opener = match prior {
            0 => "Starting fresh, no prior context included.".to_string(),
            1 => "Drawing on 1 earlier message for context.".to_string(),
            n => format!("Drawing on {n} earlier messages for context."),
        };

        format!(
            "{opener}\n\nA snippet that echoes your words back:\n\n```sh\necho '{prompt_line}'\n```\n\nThat is everything {model} has to say about it.",
            model = request.model,
        )
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), TransportError> {
        if request.messages.is_empty() {
            return Err(TransportError::RequestFailed(
                "empty message list".to_string(),
            ));
        }

        let reply = Self::compose_reply(&request);
        for token in split_tokens(&reply) {
            if !self.token_delay.is_zero() {
                tokio::time::sleep(self.token_delay).await;
            }
            tx.send(StreamEvent::Token(token))
                .await
                .map_err(|_| TransportError::ChannelClosed)?;
        }

        let tokens_in = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
        tx.send(StreamEvent::Done {
            tokens_in: Some(tokens_in),
            tokens_out: Some(estimate_tokens(&reply)),
        })
        .await
        .map_err(|_| TransportError::ChannelClosed)?;
        Ok(())
    }
}

/// Split into word-plus-trailing-whitespace fragments so concatenating the
/// fragments reproduces the reply byte for byte.
fn split_tokens(reply: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = false;
    for ch in reply.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
        } else if in_whitespace {
            tokens.push(std::mem::take(&mut current));
            in_whitespace = false;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count() as i64 / 4).max(1)
}

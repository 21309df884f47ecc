//! Chat completion interface.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::AssembledContext;
use crate::error::Result;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Default instructions placed ahead of retrieved context.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer using the \
provided context when it is relevant. If the context does not contain the answer, say so \
instead of guessing.";

/// Prepend a system message carrying `context` to the conversation.
pub fn with_context(
    system_prompt: &str,
    context: &AssembledContext,
    messages: &[ChatMessage],
) -> Vec<ChatMessage> {
    let system = if context.is_empty() {
        system_prompt.to_string()
    } else {
        format!("{system_prompt}\n\nContext:\n{}", context.text)
    };

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage::system(system));
    out.extend(messages.iter().cloned());
    out
}

/// The content of the last user message, if any.
pub fn last_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages.iter().rev().find(|m| m.role == ChatRole::User).map(|m| m.content.as_str())
}

/// Incremental completion text.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The model name, for logs.
    fn name(&self) -> &str;

    /// Produce a full completion for `messages`.
    async fn complete(&self, messages: &[ChatMessage], cancel: &CancellationToken)
    -> Result<String>;

    /// Produce a completion as a stream of text deltas.
    ///
    /// The stream ends when the completion is finished. Once `cancel` fires it
    /// yields [`RagError::Cancelled`](crate::error::RagError::Cancelled) and stops.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatStream>;
}

//! The chat-collaborator interface consumed by the generative reranker.
//!
//! Concrete providers (OpenAI-compatible HTTP clients, local runtimes, ...)
//! live outside this crate; anything that can turn a list of role-tagged
//! messages into generated text can implement [`ChatModel`] and plug in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a single chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a chat exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generated text plus the identifier of the model that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

/// Error raised by a chat collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The provider rejected or failed the request.
    #[error("chat request failed: {0}")]
    Request(String),

    /// The provider returned a response this crate could not use.
    #[error("chat response invalid: {0}")]
    Response(String),
}

/// A chat-capable language model collaborator.
///
/// Implementations are expected to be cheap to share behind an `Arc` and to
/// block (await) until generation completes; cancellation and streaming are
/// provider concerns outside this interface.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generates a completion for `messages` at the given temperature.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<ChatResponse, ChatError>;
}

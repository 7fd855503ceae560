//! Language model provider abstraction.
//!
//! The turn pipeline talks to a language model twice per turn: once to
//! extract booking fields and once to write the spoken reply. Both go
//! through [`LlmProvider::complete`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use callbook_core::error::Result;

pub mod openai;

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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
}

/// A single non-streaming completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// The core language model trait.
///
/// Failures are reported as `CallbookError::Generation`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "deepseek", "openai").
    fn id(&self) -> &str;

    /// Run a chat completion and return the first choice's text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

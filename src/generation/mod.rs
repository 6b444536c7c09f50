//! Chat model abstraction.
//!
//! Answer composition, query expansion, reranking, and judge grading all
//! go through the [`Generator`] trait so tests can script the model.

mod openai;

pub use openai::OpenAiGenerator;

use crate::error::Result;
use async_trait::async_trait;

/// Role of one message in a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
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

/// A complete chat completion request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    /// Sampling temperature, clamped to [0, 2] by the composer.
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Trait for chat completion backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one chat completion and return the assistant text.
    async fn complete(&self, request: GenerationRequest) -> Result<String>;
}

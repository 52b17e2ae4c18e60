//! AI provider seam — chat completion, transcription, and speech synthesis
//! behind one injected trait.
//!
//! The Router and Session Pipeline depend only on [`AiProvider`]; provider
//! selection, retry, and fallback live in [`FailoverProvider`].

pub mod failover;
pub mod openai_compat;

pub use failover::FailoverProvider;
pub use openai_compat::OpenAiCompatProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// A chat-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider to constrain output to a single JSON object.
    pub json_mode: bool,
    /// Per-call timeout. Treated like any other failure on expiry.
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 1024,
            temperature: 0.7,
            json_mode: false,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A chat-completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Unified interface over the external AI services the core consumes.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// One chat-completion call.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Speech-to-text for a single audio payload.
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String, ProviderError>;

    /// Text-to-speech; returns encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Strip Markdown code fences an LLM may wrap around JSON output.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hola")])
            .with_max_tokens(256)
            .with_temperature(0.1)
            .with_json_mode()
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.max_tokens, 256);
        assert!(request.json_mode);
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }
}

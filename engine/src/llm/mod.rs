//! LLM Provider Abstraction Layer
//!
//! The goal pipeline treats the language model as an untrusted oracle with
//! three capabilities: a one-shot completion, a streamed chat reply, and an
//! availability check. The `LLMProvider` trait is that contract; Anthropic
//! and Ollama implement it over HTTP and `ScriptedProvider` replays canned
//! replies in-process.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::LLMConfig;

pub mod anthropic;
pub mod ollama;
pub mod scripted;
pub mod stream;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Lazy, finite, non-restartable sequence of reply fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LLMError {
    /// Map a non-success HTTP status to the matching error
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(body),
            429 => LLMError::RateLimitExceeded,
            500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, body)),
            _ => LLMError::InvalidRequest(format!("{}: {}", status, body)),
        }
    }

    /// Map a transport failure from reqwest
    pub(crate) fn from_reqwest(e: reqwest::Error, base_url: &str) -> Self {
        if e.is_timeout() {
            LLMError::Timeout
        } else if e.is_connect() {
            LLMError::ProviderUnavailable(format!("Cannot connect to {}", base_url))
        } else {
            LLMError::NetworkError(e.to_string())
        }
    }
}

/// Message in a conversation history sent to the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

impl From<&sdk::Message> for Message {
    fn from(msg: &sdk::Message) -> Self {
        match msg.role {
            sdk::Role::User => Message::user(msg.content.clone()),
            sdk::Role::Assistant => Message::assistant(msg.content.clone()),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "anthropic", "ollama")
    fn name(&self) -> &str;

    /// Returns the model requests are sent to
    fn model(&self) -> &str;

    /// Whether the provider is configured well enough to attempt a call
    fn is_available(&self) -> bool;

    /// Generate a single completion for one user prompt
    ///
    /// # Returns
    /// * `Ok(String)` - The reply text, trimmed
    /// * `Err(LLMError)` - If the provider is not configured or the request fails
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Stream a chat reply for the given history, oldest message first
    async fn generate_stream(&self, messages: &[Message], max_tokens: u32) -> Result<TextStream>;
}

/// Build the provider named by `llm.provider`
pub fn provider_from_config(config: &LLMConfig) -> Arc<dyn LLMProvider> {
    match config.provider.as_str() {
        "ollama" => Arc::new(ollama::OllamaProvider::new(
            config.ollama.base_url.clone(),
            config.ollama.model.clone(),
        )),
        _ => Arc::new(anthropic::AnthropicProvider::from_config(&config.anthropic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);
    }

    #[test]
    fn test_conversion_from_chat_log() {
        let logged = sdk::Message::assistant("msg_1", "Sure, here you go");
        let msg = Message::from(&logged);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "Sure, here you go");
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            LLMError::from_status(StatusCode::UNAUTHORIZED, "bad key".into()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            LLMError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            LLMError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            LLMError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            LLMError::from_status(StatusCode::BAD_REQUEST, String::new()),
            LLMError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_provider_selection() {
        let mut config = LLMConfig::default();
        assert_eq!(provider_from_config(&config).name(), "anthropic");

        config.provider = "ollama".to_string();
        let provider = provider_from_config(&config);
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.1:8b");
    }
}

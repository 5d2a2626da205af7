//! Ollama LLM Provider
//!
//! This module implements the LLMProvider trait for Ollama, a local LLM provider.
//! Ollama runs models locally on the user's machine, typically at http://localhost:11434.
//!
//! Key features:
//! - Local execution (no API keys required)
//! - `/api/chat` for both one-shot completions and streamed replies
//! - Newline-delimited JSON streaming
//! - `max_tokens` forwarded as `options.num_predict`

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stream::{decode_lines, Decoded};
use super::{LLMError, LLMProvider, Message, MessageRole, Result, TextStream};

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llama3.1:8b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    /// Convert our Message format to Ollama's format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: match msg.role {
                    MessageRole::User => "user".to_string(),
                    MessageRole::Assistant => "assistant".to_string(),
                    MessageRole::System => "system".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    async fn chat(
        &self,
        messages: &[Message],
        max_tokens: u32,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let ollama_messages = self.convert_messages(messages);

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}, stream={}",
            self.model,
            ollama_messages.len(),
            ollama_messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>(),
            stream
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: ollama_messages,
            stream,
            options: OllamaOptions {
                num_predict: max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

fn decode_chunk(line: &str) -> Result<Decoded> {
    if line.trim().is_empty() {
        return Ok(Decoded::Skip);
    }

    let chunk: OllamaStreamChunk = serde_json::from_str(line)
        .map_err(|e| LLMError::ParseError(format!("Bad Ollama stream line: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(LLMError::ProviderUnavailable(error));
    }

    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    if chunk.done && text.is_empty() {
        Ok(Decoded::Done)
    } else {
        Ok(Decoded::Text(text))
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty() && !self.model.is_empty()
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let start = std::time::Instant::now();
        let response = self.chat(&[Message::user(prompt)], max_tokens, false).await?;

        tracing::info!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(ollama_response.message.content.trim().to_string())
    }

    async fn generate_stream(&self, messages: &[Message], max_tokens: u32) -> Result<TextStream> {
        let response = self.chat(messages, max_tokens, true).await?;
        Ok(decode_lines(response.bytes_stream(), decode_chunk))
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

/// One line of a streamed `/api/chat` response
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

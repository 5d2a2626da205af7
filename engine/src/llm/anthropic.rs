use super::stream::{decode_lines, Decoded, SseParser};
use super::{LLMError, LLMProvider, Message, MessageRole, TextStream};
use crate::config::AnthropicConfig;
use crate::secrets::{self, SecretString};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub struct AnthropicProvider {
    base_url: String,
    model: String,
    api_version: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

/// One event payload of the Messages streaming API
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl AnthropicProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_version: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_version: api_version.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the key from the configured environment variable
    pub fn from_config(config: &AnthropicConfig) -> Self {
        let api_key = secrets::from_env(&config.api_key_env);
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; Anthropic provider unavailable",
                config.api_key_env
            );
        }
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            config.api_version.clone(),
            api_key,
        )
    }

    fn key(&self) -> super::Result<&SecretString> {
        self.api_key.as_ref().ok_or_else(|| {
            LLMError::ProviderUnavailable("Anthropic API key not configured".to_string())
        })
    }

    async fn post(&self, payload: serde_json::Value) -> super::Result<reqwest::Response> {
        let api_key = self.key()?;
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.unsecure())
            .header("anthropic-version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, text));
        }

        Ok(response)
    }
}

fn to_api_messages(messages: &[Message]) -> (String, Vec<serde_json::Value>) {
    let mut system_prompt = String::new();
    let mut api_messages = Vec::new();
    for msg in messages {
        if msg.role == MessageRole::System {
            system_prompt.push_str(&msg.content);
            system_prompt.push('\n');
            continue;
        }
        api_messages.push(json!({
            "role": if msg.role == MessageRole::Assistant { "assistant" } else { "user" },
            "content": msg.content
        }));
    }
    (system_prompt, api_messages)
}

fn decode_event_data(data: &str) -> super::Result<Decoded> {
    let payload: StreamPayload = serde_json::from_str(data)
        .map_err(|e| LLMError::ParseError(format!("Bad stream event: {}", e)))?;

    match payload {
        StreamPayload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => Ok(Decoded::Text(text)),
        StreamPayload::MessageStop => Ok(Decoded::Done),
        StreamPayload::Error { error } => Err(LLMError::ProviderUnavailable(error.message)),
        _ => Ok(Decoded::Skip),
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> super::Result<String> {
        let payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self.post(payload).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let mut full_content = String::new();
        for item in content_arr {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                full_content.push_str(text);
            }
        }

        tracing::debug!(
            model = %self.model,
            chars = full_content.len(),
            "Anthropic completion received"
        );

        Ok(full_content.trim().to_string())
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        max_tokens: u32,
    ) -> super::Result<TextStream> {
        let (system_prompt, api_messages) = to_api_messages(messages);

        let mut payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": api_messages,
            "stream": true,
        });
        if !system_prompt.is_empty() {
            payload["system"] = json!(system_prompt.trim_end());
        }

        let response = self.post(payload).await?;

        let mut parser = SseParser::new();
        Ok(decode_lines(response.bytes_stream(), move |line| {
            match parser.process_line(line) {
                Some(event) if !event.data.is_empty() => decode_event_data(&event.data),
                _ => Ok(Decoded::Skip),
            }
        }))
    }
}

//! OpenAI-compatible provider
//!
//! Works with any API that implements the OpenAI chat completions format:
//! - Groq (api.groq.com), the default
//! - OpenAI (api.openai.com)
//! - vLLM, LM Studio, Ollama and other local servers

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::sse::decode_deltas;
use super::{CompletionProvider, DeltaStream, ProviderError};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.groq.com/openai/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Model used when the caller passes an empty model name
    pub default_model: String,
    /// Request timeout in seconds, covering the whole streamed body
    pub timeout_secs: u64,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            default_model: crate::config::DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

impl OpenAICompatConfig {
    /// Create config for Groq
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some(api_key.into()),
            default_model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
        }
    }

    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            default_model: model.into(),
            timeout_secs: 300, // Local inference can be slower
        }
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    name: String,
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    pub fn new(name: impl Into<String>, config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    fn request(&self, messages: &[Message], model: &str, stream: bool) -> RequestBuilder {
        let url = format!("{}/chat/completions", self.config.base_url);

        let body = ChatCompletionRequest {
            model: if model.is_empty() {
                self.config.default_model.clone()
            } else {
                model.to_string()
            },
            messages: messages.iter().map(ChatMessage::from).collect(),
            stream,
        };

        let mut req_builder = self.client.post(url);

        // Add authorization if API key is provided
        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        req_builder.json(&body)
    }
}

fn api_error(status: StatusCode, body: &str) -> ProviderError {
    if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(body) {
        return ProviderError::InvalidResponse(format!(
            "API error ({}): {}",
            status, error_resp.error.message
        ));
    }
    ProviderError::InvalidResponse(format!("HTTP {}: {}", status, body))
}

/// First choice's content, `""` when the provider sent none
fn first_choice_text(body: &str) -> Result<String, ProviderError> {
    let completion: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
    })?;

    Ok(completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

#[async_trait]
impl CompletionProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, messages: &[Message], model: &str) -> Result<String, ProviderError> {
        let response = self.request(messages, model, false).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        first_choice_text(&body)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<DeltaStream, ProviderError> {
        let response = self.request(messages, model, true).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        tracing::debug!(provider = %self.name, "Upstream stream opened");
        Ok(decode_deltas(response.bytes_stream()))
    }
}

//! Completion provider integrations

mod openai_compat;
pub mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::conversation::Message;

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Incremental text deltas from a streamed completion.
///
/// End of stream means the provider finished; an `Err` item is the last item
/// of a failed stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A hosted chat completion API
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Request one fully materialized reply; missing content is `""`
    async fn chat(&self, messages: &[Message], model: &str) -> Result<String, ProviderError>;

    /// Request an incremental reply.
    ///
    /// Errors returned here happen before any delta exists; errors after that
    /// arrive through the stream.
    async fn chat_stream(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<DeltaStream, ProviderError>;
}

/// Build the configured provider, checking that its credentials are present
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
    let mut compat = match config.provider.to_lowercase().as_str() {
        "groq" => {
            let key = config
                .groq_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("GROQ_API_KEY is not set".into()))?;
            OpenAICompatConfig::groq(key)
        }
        "openai" => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
            OpenAICompatConfig::openai(key)
        }
        "local" => {
            let url = config.base_url.clone().ok_or_else(|| {
                ProviderError::NotConfigured("LLM_BASE_URL is required for the local provider".into())
            })?;
            OpenAICompatConfig::local(url, config.model.clone())
        }
        other => return Err(ProviderError::UnknownProvider(other.to_string())),
    };

    if let Some(url) = &config.base_url {
        compat.base_url = url.trim_end_matches('/').to_string();
    }

    Ok(Arc::new(OpenAICompatProvider::new(
        config.provider.to_lowercase(),
        compat,
    )?))
}

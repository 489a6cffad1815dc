//! Deterministic providers, embedders and stores for tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::conversation::{Message, Role};
use crate::providers::{CompletionProvider, DeltaStream, ProviderError};
use crate::rag::{Embedder, RetrievalError, Snippet, VectorStore};

fn last_user(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Replies with the last user message; streams it word by word
pub struct EchoProvider {
    seen: Mutex<Vec<Vec<Message>>>,
}

impl EchoProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Every message list the provider received, oldest first
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, messages: &[Message], _model: &str) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(last_user(messages))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _model: &str,
    ) -> Result<DeltaStream, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let pieces: Vec<Result<String, ProviderError>> = last_user(messages)
            .split_inclusive(' ')
            .map(|p| Ok(p.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(pieces)))
    }
}

/// Fails outright on `chat`; streams two deltas then an error.
///
/// Each stream item is delayed so the response head and the first deltas
/// reach the client before the failure.
pub struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn chat(&self, _messages: &[Message], _model: &str) -> Result<String, ProviderError> {
        Err(ProviderError::InvalidResponse("HTTP 429: rate limited".into()))
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _model: &str,
    ) -> Result<DeltaStream, ProviderError> {
        let items = stream::iter(vec![
            Ok("Partial ".to_string()),
            Ok("reply".to_string()),
            Err(ProviderError::InvalidResponse("connection reset".into())),
        ]);
        Ok(Box::pin(items.then(|item| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            item
        })))
    }
}

/// Streams nothing but an immediate error
pub struct FailFastProvider;

#[async_trait]
impl CompletionProvider for FailFastProvider {
    fn name(&self) -> &str {
        "fail-fast"
    }

    async fn chat(&self, _messages: &[Message], _model: &str) -> Result<String, ProviderError> {
        Err(ProviderError::InvalidResponse("connection reset".into()))
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _model: &str,
    ) -> Result<DeltaStream, ProviderError> {
        Ok(Box::pin(stream::iter(vec![Err(ProviderError::InvalidResponse(
            "connection reset".into(),
        ))])))
    }
}

/// Rejects the request before any delta is produced
pub struct RejectingProvider;

#[async_trait]
impl CompletionProvider for RejectingProvider {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn chat(&self, _messages: &[Message], _model: &str) -> Result<String, ProviderError> {
        Err(ProviderError::InvalidResponse("API error (401): Invalid API Key".into()))
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _model: &str,
    ) -> Result<DeltaStream, ProviderError> {
        Err(ProviderError::InvalidResponse("API error (401): Invalid API Key".into()))
    }
}

/// Always embeds to `[1, 0]`
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(vec![1.0, 0.0])
    }
}

/// Returns the same documents for every query, in the given order
pub struct FixedStore {
    texts: Vec<String>,
    last_request: Mutex<Option<(usize, usize)>>,
}

impl FixedStore {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            last_request: Mutex::new(None),
        }
    }

    /// `(limit, num_candidates)` of the latest search
    pub fn last_request(&self) -> Option<(usize, usize)> {
        *self.last_request.lock().unwrap()
    }
}

#[async_trait]
impl VectorStore for FixedStore {
    async fn search(
        &self,
        _query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        *self.last_request.lock().unwrap() = Some((limit, num_candidates));
        Ok(self
            .texts
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, text)| Snippet {
                text: text.clone(),
                rank: i + 1,
                score: 1.0 - i as f32 * 0.1,
            })
            .collect())
    }
}

/// Store whose connection is down
pub struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn search(
        &self,
        _query: &[f32],
        _limit: usize,
        _num_candidates: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        Err(RetrievalError::Store(sqlx::Error::PoolTimedOut))
    }
}

//! Chat engine
//!
//! The ChatEngine turns an incoming conversation into a provider request:
//! 1. Rejects empty conversations
//! 2. Picks the system instruction (retrieval-augmented on the chat path
//!    when a retriever is configured)
//! 3. Prepends it to the caller's messages
//! 4. Asks the provider for a whole reply or a delta stream
//!
//! Nothing is kept between calls.

use std::sync::Arc;

use crate::config::Prompts;
use crate::conversation::Message;
use crate::providers::{CompletionProvider, DeltaStream, ProviderError};
use crate::rag::{RetrievalError, Retriever};

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),
}

pub struct ChatEngine {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    prompts: Prompts,
    retriever: Option<Retriever>,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>, prompts: Prompts) -> Self {
        Self {
            provider,
            model: model.into(),
            prompts,
            retriever: None,
        }
    }

    /// Augment chat requests with retrieved context
    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retrieval_enabled(&self) -> bool {
        self.retriever.is_some()
    }

    /// Instruction for the non-streaming path
    pub async fn chat_instruction(&self, messages: &[Message]) -> Result<String, ChatError> {
        let Some(retriever) = &self.retriever else {
            return Ok(self.prompts.chat.clone());
        };

        let query = messages
            .last()
            .map(|m| m.content.as_str())
            .ok_or(ChatError::EmptyConversation)?;
        let context = retriever.context_for(query).await?;
        Ok(self.prompts.with_context(&context))
    }

    /// Get a complete reply
    pub async fn reply(&self, messages: &[Message]) -> Result<String, ChatError> {
        ensure_not_empty(messages)?;

        let system = self.chat_instruction(messages).await?;
        let request = compose(system, messages);

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            messages = request.len(),
            "Requesting completion"
        );
        let reply = self.provider.chat(&request, &self.model).await?;
        Ok(reply)
    }

    /// Open a streamed reply
    pub async fn stream(&self, messages: &[Message]) -> Result<DeltaStream, ChatError> {
        ensure_not_empty(messages)?;

        let request = compose(self.prompts.stream.clone(), messages);

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            messages = request.len(),
            "Requesting streamed completion"
        );
        let deltas = self.provider.chat_stream(&request, &self.model).await?;
        Ok(deltas)
    }
}

fn ensure_not_empty(messages: &[Message]) -> Result<(), ChatError> {
    if messages.is_empty() {
        Err(ChatError::EmptyConversation)
    } else {
        Ok(())
    }
}

/// System instruction first, then the conversation in order
pub fn compose(system: String, messages: &[Message]) -> Vec<Message> {
    let mut request = Vec::with_capacity(messages.len() + 1);
    request.push(Message::system(system));
    request.extend_from_slice(messages);
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::test_support::{BrokenStore, EchoProvider, FailingProvider, FixedEmbedder, FixedStore};
    use futures::StreamExt;

    fn engine(provider: Arc<dyn CompletionProvider>) -> ChatEngine {
        ChatEngine::new(provider, "llama-3.1-8b-instant", Prompts::default())
    }

    #[test]
    fn test_compose_prepends_system() {
        let messages = vec![Message::user("Hi"), Message::assistant("Hello"), Message::user("Budget?")];
        let request = compose("be brief".into(), &messages);
        assert_eq!(request.len(), 4);
        assert_eq!(request[0], Message::system("be brief"));
        assert_eq!(&request[1..], &messages[..]);
    }

    #[tokio::test]
    async fn test_reply_sends_chat_instruction() {
        let provider = EchoProvider::new();
        let engine = engine(provider.clone());

        let reply = engine.reply(&[Message::user("Hello")]).await.unwrap();
        assert_eq!(reply, "Hello");

        let sent = &provider.requests()[0];
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains("You are FATE"));
        assert_eq!(sent[1], Message::user("Hello"));
    }

    #[tokio::test]
    async fn test_stream_uses_stream_instruction() {
        let provider = EchoProvider::new();
        let engine = engine(provider.clone());

        let deltas: Vec<String> = engine
            .stream(&[Message::user("Save ten percent")])
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas.concat(), "Save ten percent");
        assert_eq!(
            provider.requests()[0][0].content,
            crate::config::prompts_builtin::CONCISE_ASSISTANT
        );
    }

    #[tokio::test]
    async fn test_empty_conversation_rejected() {
        let engine = engine(EchoProvider::new());
        assert!(matches!(engine.reply(&[]).await, Err(ChatError::EmptyConversation)));
        assert!(matches!(engine.stream(&[]).await, Err(ChatError::EmptyConversation)));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let engine = engine(Arc::new(FailingProvider));
        let err = engine.reply(&[Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));
    }

    #[tokio::test]
    async fn test_retrieval_context_in_system_instruction() {
        let provider = EchoProvider::new();
        let store = Arc::new(FixedStore::new(&[
            "Roth IRAs grow tax free.",
            "Emergency funds cover 3-6 months.",
            "Index funds have low fees.",
        ]));
        let engine = engine(provider.clone()).with_retriever(Retriever::new(
            Arc::new(FixedEmbedder),
            store,
            3,
            100,
        ));

        engine.reply(&[Message::user("Where should I save?")]).await.unwrap();

        let system = &provider.requests()[0][0].content;
        assert!(system.contains(
            "Roth IRAs grow tax free.\n\nEmergency funds cover 3-6 months.\n\nIndex funds have low fees."
        ));
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_an_error() {
        let provider = EchoProvider::new();
        let engine = engine(provider.clone()).with_retriever(Retriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(BrokenStore),
            3,
            100,
        ));

        let err = engine.reply(&[Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, ChatError::Retrieval(_)));
        assert!(provider.requests().is_empty());
    }
}

//! Retrieval augmentation
//!
//! Embeds the latest message, pulls the nearest documents from the vector
//! store, and joins their text into a context block for the system prompt.

pub mod embedding;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use embedding::{Embedder, HttpEmbedder, LazyEmbedder};
pub use store::{SqliteVectorStore, StoredDocument, VectorStore};

/// Separator between documents in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vector store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// One retrieved document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    /// 1-based position in similarity order
    pub rank: usize,
    pub score: f32,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    limit: usize,
    num_candidates: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        limit: usize,
        num_candidates: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            limit,
            num_candidates,
        }
    }

    /// Nearest documents to `query`, in store order
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Snippet>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let snippets = self
            .store
            .search(&vector, self.limit, self.num_candidates)
            .await?;

        tracing::debug!(matches = snippets.len(), "Retrieved context");
        Ok(snippets)
    }

    /// Retrieve and join into a context block
    pub async fn context_for(&self, query: &str) -> Result<String, RetrievalError> {
        Ok(build_context(&self.retrieve(query).await?))
    }
}

pub fn build_context(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

//! Text embedding
//!
//! Embeddings come from an OpenAI-compatible `/embeddings` endpoint (Ollama,
//! OpenAI, vLLM). Each request carries a single input, so the endpoint
//! normally returns one row and pooling leaves it unchanged; servers that
//! return several rows for one input get them mean-pooled. The result is
//! always L2-normalized.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::EmbeddingConfig;

use super::RetrievalError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a fixed-length, unit-norm vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder backed by an HTTP embedding endpoint
pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build the client and probe the model once to learn its dimension
    pub async fn connect(config: EmbeddingConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        let mut embedder = Self {
            client,
            config,
            dimension: 0,
        };

        let probe = embedder.request("dimension probe").await?;
        embedder.dimension = probe.len();
        tracing::info!(
            model = %embedder.config.model,
            dimension = embedder.dimension,
            "Embedding model ready"
        );

        Ok(embedder)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let mut req_builder = self.client.post(url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: vec![text],
        });
        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!("HTTP {}: {}", status, body)));
        }

        let body: EmbeddingResponse = response.json().await?;
        let rows: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        pool_and_normalize(&rows)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let vector = self.request(text).await?;
        if self.dimension != 0 && vector.len() != self.dimension {
            return Err(RetrievalError::Embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

/// Mean-pool equal-length vectors, then scale to unit length
pub fn pool_and_normalize(rows: &[Vec<f32>]) -> Result<Vec<f32>, RetrievalError> {
    let first = rows
        .first()
        .ok_or_else(|| RetrievalError::Embedding("Embedding endpoint returned no vectors".into()))?;
    let dim = first.len();
    if dim == 0 || rows.iter().any(|r| r.len() != dim) {
        return Err(RetrievalError::Embedding(
            "Embedding vectors are empty or of unequal length".into(),
        ));
    }

    let mut pooled = vec![0.0f32; dim];
    for row in rows {
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
    }
    let count = rows.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);

    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        pooled.iter_mut().for_each(|v| *v /= norm);
    }
    Ok(pooled)
}

type InitFn =
    dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Embedder>, RetrievalError>> + Send + Sync;

/// Embedder built on first use.
///
/// Concurrent first callers share a single pending initialization; if it
/// fails, the next caller tries again.
pub struct LazyEmbedder {
    cell: OnceCell<Arc<dyn Embedder>>,
    init: Box<InitFn>,
}

impl LazyEmbedder {
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Embedder>, RetrievalError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Box::new(move || Box::pin(init())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    async fn get(&self) -> Result<&Arc<dyn Embedder>, RetrievalError> {
        self.cell.get_or_try_init(|| (self.init)()).await
    }
}

#[async_trait]
impl Embedder for LazyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.get().await?.embed(text).await
    }
}

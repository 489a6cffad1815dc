//! Vector store backed by a SQLite connection pool
//!
//! Documents are stored with their embedding as a JSON array. A search
//! examines the most recent `num_candidates` rows, scores each by cosine
//! similarity against the query, and returns the best `limit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::VectorStoreConfig;

use super::{RetrievalError, Snippet};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest documents to `query`, best first
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<Snippet>, RetrievalError>;
}

/// A stored document with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteVectorStore {
    /// Open a pooled store. The table name must already be validated.
    pub async fn connect(config: &VectorStoreConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        // Create parent directories if they don't exist
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            table: config.collection.clone(),
        };
        store.init_schema().await?;
        tracing::info!(url = %config.url, table = %store.table, "Vector store connected");
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub async fn new_in_memory(table: &str) -> Result<Self, sqlx::Error> {
        // Every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created_at)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a document and return its id
    pub async fn add_document(
        &self,
        text: &str,
        embedding: &[f32],
    ) -> Result<String, RetrievalError> {
        if embedding.is_empty() {
            return Err(RetrievalError::InvalidQuery("Embedding is empty".into()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let encoded = serde_json::to_string(embedding)
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, content, embedding, created_at) VALUES (?, ?, ?, ?)",
            self.table
        ))
        .bind(&id)
        .bind(text)
        .bind(encoded)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn count_documents(&self) -> Result<i64, RetrievalError> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recent documents first
    pub async fn list_documents(&self, limit: usize) -> Result<Vec<StoredDocument>, RetrievalError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(&format!(
            "SELECT id, content, embedding, created_at FROM {} ORDER BY created_at DESC, rowid DESC LIMIT ?",
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, text, embedding, created_at)| -> Result<StoredDocument, RetrievalError> {
                Ok(StoredDocument {
                    id,
                    text,
                    dimension: decode_embedding(&embedding)?.len(),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| RetrievalError::Decode(e.to_string()))?,
                })
            })
            .collect()
    }

    /// Returns whether a document was removed
    pub async fn delete_document(&self, id: &str) -> Result<bool, RetrievalError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        if limit == 0 || num_candidates < limit {
            return Err(RetrievalError::InvalidQuery(format!(
                "num_candidates ({}) must be >= limit ({}) and limit > 0",
                num_candidates, limit
            )));
        }

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT content, embedding FROM {} ORDER BY created_at DESC, rowid DESC LIMIT ?",
            self.table
        ))
        .bind(num_candidates as i64)
        .fetch_all(&mut *conn)
        .await?;
        // Back to the pool before scoring
        drop(conn);

        let mut scored = Vec::with_capacity(rows.len());
        for (text, embedding) in rows {
            let embedding = decode_embedding(&embedding)?;
            if embedding.len() != query.len() {
                tracing::warn!(
                    expected = query.len(),
                    got = embedding.len(),
                    "Skipping document with mismatched embedding dimension"
                );
                continue;
            }
            scored.push((text, cosine_similarity(query, &embedding)));
        }

        // Sort by similarity score (highest first)
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (text, score))| Snippet {
                text,
                rank: i + 1,
                score,
            })
            .collect())
    }
}

fn decode_embedding(raw: &str) -> Result<Vec<f32>, RetrievalError> {
    serde_json::from_str(raw).map_err(|e| RetrievalError::Decode(format!("Bad embedding: {}", e)))
}

/// Cosine similarity of two equal-length vectors; 0 when either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

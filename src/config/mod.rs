//! Application configuration

pub mod prompts;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use prompts::{builtin as prompts_builtin, PromptError, PromptTemplate, Prompts};

/// Model used when `CHAT_MODEL` is not set
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub llm: LlmConfig,
    pub prompts: PromptFiles,
    /// Retrieval is enabled only when a vector store is configured
    pub vector_store: Option<VectorStoreConfig>,
    pub embedding: EmbeddingConfig,
}

/// Completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "groq", "openai" or "local"
    pub provider: String,
    pub model: String,
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Overrides the provider's base URL; required for "local"
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptFiles {
    pub chat: Option<PathBuf>,
    pub stream: Option<PathBuf>,
    pub retrieval: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Connection string, e.g. `sqlite://data/vectors.db`
    pub url: String,
    /// Table holding the documents
    pub collection: String,
    pub max_connections: u32,
    /// Rows examined per query
    pub num_candidates: usize,
    /// Matches spliced into the prompt
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL (Ollama serves one under `/v1`)
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let vector_store = match env::var("VECTOR_DB_URL").ok() {
            Some(url) => Some(VectorStoreConfig {
                url,
                collection: env::var("VECTOR_COLLECTION").unwrap_or_else(|_| "documents".into()),
                max_connections: parse_var("VECTOR_MAX_CONNECTIONS")?.unwrap_or(5),
                num_candidates: parse_var("VECTOR_NUM_CANDIDATES")?.unwrap_or(100),
                limit: parse_var("VECTOR_LIMIT")?.unwrap_or(3),
            }),
            None => None,
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: parse_var("PORT")?.unwrap_or(3000),
            llm: LlmConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "groq".into()),
                model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
                groq_api_key: env::var("GROQ_API_KEY").ok(),
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
            },
            prompts: PromptFiles {
                chat: env::var("SYSTEM_PROMPT_FILE").ok().map(PathBuf::from),
                stream: env::var("STREAM_PROMPT_FILE").ok().map(PathBuf::from),
                retrieval: env::var("RAG_PROMPT_FILE").ok().map(PathBuf::from),
            },
            vector_store,
            embedding: EmbeddingConfig {
                base_url: env::var("EMBEDDING_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434/v1".into()),
                model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".into()),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Presence and range checks
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(store) = &self.vector_store {
            if store.limit == 0 {
                return Err(ConfigError::Validation("VECTOR_LIMIT must be at least 1".into()));
            }
            if store.num_candidates < store.limit {
                return Err(ConfigError::Validation(format!(
                    "VECTOR_NUM_CANDIDATES ({}) must be >= VECTOR_LIMIT ({})",
                    store.num_candidates, store.limit
                )));
            }
            if store.collection.is_empty()
                || !store
                    .collection
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(ConfigError::Validation(format!(
                    "VECTOR_COLLECTION '{}' must be alphanumeric or '_'",
                    store.collection
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Validation(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 3000,
            llm: LlmConfig {
                provider: "groq".into(),
                model: DEFAULT_MODEL.into(),
                groq_api_key: Some("key".into()),
                openai_api_key: None,
                base_url: None,
            },
            prompts: PromptFiles::default(),
            vector_store: Some(VectorStoreConfig {
                url: "sqlite::memory:".into(),
                collection: "documents".into(),
                max_connections: 1,
                num_candidates: 100,
                limit: 3,
            }),
            embedding: EmbeddingConfig {
                base_url: "http://localhost:11434/v1".into(),
                model: "nomic-embed-text".into(),
                api_key: None,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_candidates_below_limit() {
        let mut config = sample();
        if let Some(store) = config.vector_store.as_mut() {
            store.num_candidates = 2;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collection_name_checked() {
        let mut config = sample();
        if let Some(store) = config.vector_store.as_mut() {
            store.collection = "docs; DROP TABLE x".into();
        }
        assert!(config.validate().is_err());
    }
}

//! System instructions and prompt files
//!
//! Every request gets a fixed system instruction prepended. The built-ins
//! below can be replaced by TOML prompt files.
//!
//! # Example Prompt File
//!
//! ```toml
//! [persona]
//! name = "FATE"
//! description = "Automated financial assistant"
//!
//! [system_prompt]
//! content = """
//! You are FATE, an automated financial assistant...
//! """
//! ```
//!
//! The retrieval prompt must contain a `{context}` placeholder, which is
//! replaced with the retrieved documents.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Placeholder substituted with retrieved context
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// A persona/prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The system prompt
    pub system_prompt: SystemPrompt,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

/// System prompt content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// The full system prompt content
    pub content: String,
}

impl PromptTemplate {
    /// Load a template from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))
    }
}

/// The system instructions used by the chat engine
#[derive(Debug, Clone)]
pub struct Prompts {
    /// Prepended on `/api/chat`
    pub chat: String,
    /// Prepended on `/api/stream`
    pub stream: String,
    /// Retrieval instruction, contains [`CONTEXT_PLACEHOLDER`]
    pub retrieval: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            chat: builtin::FINANCIAL_ASSISTANT.to_string(),
            stream: builtin::CONCISE_ASSISTANT.to_string(),
            retrieval: builtin::RETRIEVAL.to_string(),
        }
    }
}

impl Prompts {
    /// Start from the built-ins and replace any prompt that has a file
    pub async fn load(
        chat: Option<&Path>,
        stream: Option<&Path>,
        retrieval: Option<&Path>,
    ) -> Result<Self, PromptError> {
        let mut prompts = Self::default();

        if let Some(path) = chat {
            prompts.chat = PromptTemplate::load_from_file(path).await?.system_prompt.content;
            tracing::info!("Loaded chat prompt from {}", path.display());
        }
        if let Some(path) = stream {
            prompts.stream = PromptTemplate::load_from_file(path).await?.system_prompt.content;
            tracing::info!("Loaded stream prompt from {}", path.display());
        }
        if let Some(path) = retrieval {
            let content = PromptTemplate::load_from_file(path).await?.system_prompt.content;
            if !content.contains(CONTEXT_PLACEHOLDER) {
                return Err(PromptError::MissingPlaceholder(path.display().to_string()));
            }
            prompts.retrieval = content;
            tracing::info!("Loaded retrieval prompt from {}", path.display());
        }

        Ok(prompts)
    }

    /// Build the retrieval instruction around a context block
    pub fn with_context(&self, context: &str) -> String {
        self.retrieval.replace(CONTEXT_PLACEHOLDER, context)
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Retrieval prompt {0} has no {{context}} placeholder")]
    MissingPlaceholder(String),
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Financial assistant instruction used by the chat endpoint
    pub const FINANCIAL_ASSISTANT: &str = r#"
You are FATE, an automated financial assistant.
- Keep responses concise and to the point.
- Use bullet points "-" for lists when providing recommendations.
- Use numbered steps "1., 2." for procedures.
- Always provide a 1-2 line summary first.
- End with "Next steps" if actionable items exist.
- Do NOT return long paragraphs; avoid unnecessary wording.
- Respect language rules and do not share sensitive info like SSNs or card numbers.
"#;

    /// General assistant instruction used by the streaming endpoint
    pub const CONCISE_ASSISTANT: &str =
        "You are a helpful AI assistant. Keep responses concise and friendly";

    /// Retrieval-augmented instruction
    pub const RETRIEVAL: &str = r#"You are FATE, an automated financial assistant.
Answer using the context below when it is relevant. If the context does not
cover the question, say so briefly and answer from general knowledge.
Keep responses concise; use "-" bullets for lists and "1., 2." for steps.

Context:
{context}"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template() {
        let toml_content = r#"
[persona]
name = "Budget Coach"
description = "Helps with monthly budgets"

[system_prompt]
content = "You are a budget coach."
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert_eq!(template.persona.name, "Budget Coach");
        assert_eq!(template.system_prompt.content, "You are a budget coach.");
    }

    #[test]
    fn test_minimal_template() {
        let toml_content = r#"
[persona]
name = "Minimal"

[system_prompt]
content = "Hello"
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert!(template.persona.description.is_empty());
    }

    #[test]
    fn test_missing_section_rejected() {
        let err = PromptTemplate::parse("[persona]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, PromptError::ParseError(_)));
    }

    #[test]
    fn test_with_context() {
        let prompts = Prompts::default();
        let system = prompts.with_context("doc one\n\ndoc two");
        assert!(system.contains("Context:\ndoc one\n\ndoc two"));
        assert!(!system.contains(CONTEXT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_load_without_files_uses_builtins() {
        let prompts = Prompts::load(None, None, None).await.unwrap();
        assert!(prompts.chat.contains("You are FATE"));
        assert_eq!(prompts.stream, builtin::CONCISE_ASSISTANT);
    }

    #[tokio::test]
    async fn test_retrieval_file_needs_placeholder() {
        let path = std::env::temp_dir().join(format!("fate-rag-{}.toml", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            "[persona]\nname = \"r\"\n\n[system_prompt]\ncontent = \"no context here\"\n",
        )
        .await
        .unwrap();

        let result = Prompts::load(None, None, Some(&path)).await;
        tokio::fs::remove_file(&path).await.ok();
        assert!(matches!(result, Err(PromptError::MissingPlaceholder(_))));
    }
}

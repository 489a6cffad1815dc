//! FATE chat - a thin relay between a chat UI and a hosted LLM
//!
//! Conversations arrive over HTTP, get a system instruction prepended
//! (optionally built from documents retrieved from a vector store), and are
//! forwarded to a Groq/OpenAI-compatible completion API. Replies go back as
//! one JSON value or as a raw byte stream.

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod client;
pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod rag;
pub mod routes;

#[cfg(test)]
mod test_support;

use crate::core::ChatEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_engine: Arc<ChatEngine>,
}

/// Router with CORS and request tracing
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

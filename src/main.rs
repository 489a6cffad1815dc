//! FATE chat server
//!
//! Serves `/api/chat` and `/api/stream` in front of the configured completion
//! provider, with retrieval augmentation when a vector store is configured.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fate_chat::config::{Config, Prompts};
use fate_chat::core::ChatEngine;
use fate_chat::providers;
use fate_chat::rag::{
    Embedder, HttpEmbedder, LazyEmbedder, RetrievalError, Retriever, SqliteVectorStore,
};
use fate_chat::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fate_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let provider = providers::from_config(&config.llm)?;
    let prompts = Prompts::load(
        config.prompts.chat.as_deref(),
        config.prompts.stream.as_deref(),
        config.prompts.retrieval.as_deref(),
    )
    .await?;

    let mut chat_engine = ChatEngine::new(provider, config.llm.model.clone(), prompts);

    if let Some(store_config) = &config.vector_store {
        let store = SqliteVectorStore::connect(store_config).await?;

        // The embedding model is probed on the first retrieval, not at startup
        let embedding = config.embedding.clone();
        let embedder = LazyEmbedder::new(move || {
            let embedding = embedding.clone();
            async move {
                let embedder = HttpEmbedder::connect(embedding).await?;
                Ok::<_, RetrievalError>(Arc::new(embedder) as Arc<dyn Embedder>)
            }
        });

        chat_engine = chat_engine.with_retriever(Retriever::new(
            Arc::new(embedder),
            Arc::new(store),
            store_config.limit,
            store_config.num_candidates,
        ));
        tracing::info!(
            "📚 Retrieval enabled: top {} of {} candidates",
            store_config.limit,
            store_config.num_candidates
        );
    }

    tracing::info!(
        "🤖 Provider {} with model {}",
        chat_engine.provider_name(),
        chat_engine.model()
    );

    let app = fate_chat::app(AppState {
        chat_engine: Arc::new(chat_engine),
    });

    tracing::info!("💬 FATE chat API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

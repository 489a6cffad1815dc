//! Terminal client for the FATE chat API
//!
//! `chat` runs an interactive session against a running server. `ingest`
//! embeds a text file paragraph by paragraph into the vector store, and
//! `list`/`delete` manage what is stored there.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fate_chat::client::{ChatClient, ClientError};
use fate_chat::config::Config;
use fate_chat::conversation::{markdown, APOLOGY};
use fate_chat::rag::{Embedder, HttpEmbedder, SqliteVectorStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the chat server
    #[arg(long, env = "FATE_API_URL", default_value = "http://127.0.0.1:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat interactively; an empty line or EOF quits
    Chat {
        /// Use the streaming endpoint
        #[arg(long)]
        stream: bool,
    },
    /// Embed a text file into the vector store, one document per paragraph
    Ingest {
        /// Text file; paragraphs are separated by blank lines
        file: PathBuf,
    },
    /// List stored documents, most recent first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a stored document by id
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fate_chat=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Chat { stream } => chat(&cli.api_url, stream).await,
        Command::Ingest { file } => ingest(&file).await,
        Command::List { limit } => list(limit).await,
        Command::Delete { id } => delete(&id).await,
    }
}

async fn chat(api_url: &str, stream: bool) -> anyhow::Result<()> {
    let mut client = ChatClient::new(api_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            break;
        }

        if stream {
            print!("fate> ");
            let result = client
                .send_streaming(&line, |piece| {
                    print!("{}", piece);
                    std::io::stdout().flush().ok();
                })
                .await;
            println!();

            match result {
                Ok(_) => {}
                Err(ClientError::Truncated(reason)) => {
                    eprintln!("[reply cut off: {}]", reason);
                }
                Err(e) => {
                    tracing::debug!("Stream request failed: {}", e);
                    println!("{}", APOLOGY);
                }
            }
        } else {
            match client.send(&line).await {
                Ok(reply) => println!("fate> {}", markdown::sanitize(&reply)),
                Err(_) => println!("fate> {}", APOLOGY),
            }
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteVectorStore> {
    let store_config = config
        .vector_store
        .as_ref()
        .context("VECTOR_DB_URL must be set to manage documents")?;
    Ok(SqliteVectorStore::connect(store_config).await?)
}

async fn ingest(file: &PathBuf) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let paragraphs = split_paragraphs(&text);

    let embedder = HttpEmbedder::connect(config.embedding.clone()).await?;

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let vector = embedder.embed(paragraph).await?;
        let id = store.add_document(paragraph, &vector).await?;
        tracing::info!("Stored paragraph {} as {}", i + 1, id);
    }

    println!(
        "Ingested {} paragraph(s) as {}-dimensional vectors; store now holds {} document(s)",
        paragraphs.len(),
        embedder.dimension(),
        store.count_documents().await?
    );
    Ok(())
}

async fn list(limit: usize) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    for doc in store.list_documents(limit).await? {
        println!(
            "{}  {}  dim={}  {}",
            doc.id,
            doc.created_at.format("%Y-%m-%d %H:%M:%S"),
            doc.dimension,
            preview(&doc.text, 60)
        );
    }
    println!("{} document(s) stored", store.count_documents().await?);
    Ok(())
}

async fn delete(id: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    if !store.delete_document(id).await? {
        anyhow::bail!("No document with id {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}

/// First line of `text`, cut to `max` characters
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

//! HTTP client for the chat API
//!
//! Keeps the conversation locally and sends the whole history on every turn,
//! either waiting for the full reply or growing an assistant placeholder as
//! streamed bytes arrive.

use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::conversation::Conversation;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Stream ended early: {0}")]
    Truncated(String),
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Incremental UTF-8 decoding across chunk boundaries.
///
/// A multibyte character split between chunks is held back until the rest
/// arrives; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to is always a char boundary
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

pub struct ChatClient {
    http: Client,
    base_url: String,
    conversation: Conversation,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            conversation: Conversation::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send a turn and wait for the whole reply.
    ///
    /// On any failure the apology message is recorded as the reply and the
    /// error is returned.
    pub async fn send(&mut self, text: &str) -> Result<String, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyInput);
        }
        self.conversation.add_user(text);

        match self.request_reply().await {
            Ok(reply) => {
                self.conversation.add_assistant(&reply);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!("Chat request failed: {}", e);
                self.conversation.add_apology();
                Err(e)
            }
        }
    }

    async fn request_reply(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({ "messages": self.conversation.messages }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status.as_u16(), &response.text().await.unwrap_or_default()));
        }

        let body: ReplyBody = response.json().await?;
        Ok(body.reply.unwrap_or_default())
    }

    /// Send a turn and stream the reply.
    ///
    /// `on_delta` sees each decoded piece as it arrives; the trailing
    /// assistant message always holds everything received so far. A stream
    /// that breaks off keeps its partial reply and returns
    /// [`ClientError::Truncated`].
    pub async fn send_streaming<F>(&mut self, text: &str, mut on_delta: F) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyInput);
        }
        self.conversation.add_user(text);

        let response = match self
            .http
            .post(format!("{}/api/stream", self.base_url))
            .json(&json!({ "messages": self.conversation.messages }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.conversation.add_apology();
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err = server_error(status.as_u16(), &response.text().await.unwrap_or_default());
            self.conversation.add_apology();
            return Err(err);
        }

        self.conversation.begin_assistant();
        let mut decoder = Utf8Decoder::default();
        let mut reply = String::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(received = reply.len(), "Reply stream broke off: {}", e);
                    return Err(ClientError::Truncated(e.to_string()));
                }
            };

            let piece = decoder.decode(&chunk);
            if piece.is_empty() {
                continue;
            }
            reply.push_str(&piece);
            self.conversation.update_last_assistant(&reply);
            on_delta(&piece);
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            reply.push_str(&rest);
            self.conversation.update_last_assistant(&reply);
            on_delta(&rest);
        }

        Ok(reply)
    }
}

fn server_error(status: u16, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());
    ClientError::Server { status, message }
}

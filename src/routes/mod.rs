//! API routes

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::conversation::Message;
use crate::core::{relay, ChatError};
use crate::AppState;

/// Content type of the streamed reply body
pub const STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    model: String,
    retrieval: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Option<Vec<Message>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Error envelope returned as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing request body
    BadRequest(String),
    /// Anything upstream; details are logged, never returned
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl ApiError {
    fn from_chat(route: &str, err: ChatError) -> Self {
        match err {
            ChatError::EmptyConversation => ApiError::BadRequest(err.to_string()),
            other => {
                tracing::error!("Error in {}: {}", route, other);
                ApiError::Internal
            }
        }
    }
}

/// Pull a non-empty message list out of the request body
fn messages_from(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<Vec<Message>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("Rejected chat body: {}", rejection.body_text());
        match rejection {
            JsonRejection::JsonDataError(_) => {
                ApiError::BadRequest("Messages must be an array of {role, content}".into())
            }
            _ => ApiError::BadRequest("Request body must be JSON".into()),
        }
    })?;

    match request.messages {
        None => Err(ApiError::BadRequest("Messages are missing".into())),
        Some(messages) if messages.is_empty() => {
            Err(ApiError::BadRequest("Messages must be a non-empty array".into()))
        }
        Some(messages) => Ok(messages),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.chat_engine.provider_name().to_string(),
        model: state.chat_engine.model().to_string(),
        retrieval: state.chat_engine.retrieval_enabled(),
    })
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let messages = messages_from(payload)?;

    let reply = state
        .chat_engine
        .reply(&messages)
        .await
        .map_err(|e| ApiError::from_chat("/api/chat", e))?;

    Ok(Json(ChatReply { reply }))
}

async fn stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let messages = messages_from(payload)?;

    let deltas = state
        .chat_engine
        .stream(&messages)
        .await
        .map_err(|e| ApiError::from_chat("/api/stream", e))?;

    Ok((
        [(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)],
        Body::from_stream(relay(deltas)),
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/stream", post(stream))
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use edibridge::agent::AssistantEvent;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use super::sse::{json_frame, SseResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ChatRequest {
    /// Conversation id and message, or `None` when the message is missing
    fn into_parts(self) -> Option<(String, String)> {
        let message = self.message.filter(|m| !m.is_empty())?;
        let conversation_id = self
            .conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("conv-{}", Uuid::new_v4()));
        Some((conversation_id, message))
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"errors": [message.into()], "successful": false})),
    )
        .into_response()
}

/// Conversation id and message of a chat body, or the 400 response to send back
fn chat_parts(
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(String, String), Response> {
    let Json(request) =
        request.map_err(|rejection| failure(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    request
        .into_parts()
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "Message is required"))
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let (conversation_id, message) = match chat_parts(request) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    info!(%conversation_id, "processing chat message");

    match state.assistant.reply(&conversation_id, &message).await {
        Ok(result) => Json(json!({
            "successful": true,
            "data": {
                "response": result.response,
                "toolsUsed": result.tools_used,
                "conversationId": conversation_id,
            }
        }))
        .into_response(),
        Err(e) => {
            error!(%conversation_id, error = %e, "assistant turn failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn chat_stream(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let (conversation_id, message) = match chat_parts(request) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    info!(%conversation_id, "processing streaming chat");

    let (tx, sse) = SseResponse::channel();
    let assistant = state.assistant.clone();

    tokio::spawn(async move {
        let mut events = assistant.reply_stream(&conversation_id, &message);
        let mut connected = true;
        while let Some(event) = events.next().await {
            if let AssistantEvent::Error { message } = &event {
                error!(%conversation_id, error = %message, "streamed turn failed");
            }
            // a disconnected client does not stop the turn
            if connected && tx.send(json_frame(&event.to_json())).await.is_err() {
                connected = false;
            }
        }
    });

    sse.into_response()
}

async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<Value> {
    let messages = state.assistant.conversation_history(&conversation_id).await;
    Json(json!({
        "successful": true,
        "data": {
            "conversationId": conversation_id,
            "messages": messages,
        }
    }))
}

async fn clear(State(state): State<AppState>, Path(conversation_id): Path<String>) -> Json<Value> {
    let removed = state.assistant.clear_conversation(&conversation_id).await;
    info!(%conversation_id, removed, "conversation cleared");
    Json(json!({
        "successful": true,
        "messages": ["Conversation cleared successfully"],
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/assistant/chat", post(chat))
        .route("/api/assistant/chat/stream", post(chat_stream))
        .route(
            "/api/assistant/conversation/:conversation_id/history",
            get(history),
        )
        .route("/api/assistant/conversation/:conversation_id", delete(clear))
        .with_state(state)
}

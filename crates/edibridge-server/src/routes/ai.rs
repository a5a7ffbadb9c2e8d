use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use edibridge::documents::DocumentQuery;
use edibridge::errors::AgentError;
use edibridge::models::message::Message;
use edibridge::providers::utils::client_message;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::sse::{data_frame, json_frame, SseResponse};
use crate::state::AppState;

/// Error body of the `/api/ai` endpoints
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = match e {
            AgentError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %e, "AI request failed");
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"status": "error", "errors": [self.message]})),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    role: String,
    content: String,
}

fn convert_messages(incoming: Vec<ClientMessage>) -> Vec<Message> {
    incoming
        .into_iter()
        .filter_map(|m| {
            let message = client_message(&m.role, &m.content);
            if message.is_none() {
                warn!("Unknown role: {}", m.role);
            }
            message
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: Option<Value>,
    #[serde(default)]
    messages: Vec<ClientMessage>,
    #[serde(default, rename = "includeEDIContext")]
    include_edi_context: bool,
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = request?;
    let message = match request.message {
        Some(Value::String(message)) => message,
        _ => return Err(ApiError::bad_request("Message is required and must be a string")),
    };
    if message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }
    info!(
        preview = %message.chars().take(50).collect::<String>(),
        "chat request"
    );

    let history = convert_messages(request.messages);
    let reply = state
        .analyst
        .chat(&message, history, request.include_edi_context)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "message": reply.content,
            "usage": reply.usage,
            "model": reply.model,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct ChatStreamRequest {
    messages: Option<Vec<ClientMessage>>,
}

async fn chat_stream(
    State(state): State<AppState>,
    request: Result<Json<ChatStreamRequest>, JsonRejection>,
) -> Result<SseResponse, ApiError> {
    let Json(request) = request?;
    let messages = request
        .messages
        .map(convert_messages)
        .ok_or_else(|| ApiError::bad_request("Messages array is required"))?;
    info!(count = messages.len(), "streaming chat");

    let (tx, sse) = SseResponse::channel();
    let analyst = state.analyst.clone();
    let done = state.stream_done.clone();

    tokio::spawn(async move {
        let mut chunks = match analyst.chat_stream(messages).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(error = %e, "failed to start chat stream");
                let _ = tx.send(json_frame(&json!({"error": e.to_string()}))).await;
                return;
            }
        };

        while let Some(chunk) = chunks.next().await {
            let frame = match chunk {
                Ok(content) => json_frame(&json!({"content": content})),
                Err(e) => {
                    error!(error = %e, "chat stream failed");
                    let _ = tx.send(json_frame(&json!({"error": e.to_string()}))).await;
                    return;
                }
            };
            if tx.send(frame).await.is_err() {
                // client went away; keep draining so the upstream call completes
                continue;
            }
        }
        let _ = tx.send(data_frame(&done)).await;
    });

    Ok(sse)
}

async fn analyze(
    State(state): State<AppState>,
    query: Result<Json<DocumentQuery>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(query) = query?;
    info!("analysis request");
    let result = state.analyst.analyze(query).await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "analysis": result.analysis,
            "metadata": {
                "documentCount": result.document_count,
                "model": result.model,
                "usage": result.usage,
                "generatedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }
    })))
}

#[derive(Debug, Deserialize)]
struct ParseQueryRequest {
    query: Option<String>,
}

async fn parse_query(
    State(state): State<AppState>,
    request: Result<Json<ParseQueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = request?;
    let query = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query is required"))?;

    let params = state.analyst.parse_query(&query).await?;
    Ok(Json(json!({
        "status": "success",
        "data": { "params": params }
    })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let configured = state.llm.configured;
    let message = if configured {
        "OpenAI service is available"
    } else {
        "OpenAI API key not configured. Set EDIBRIDGE_LLM__API_KEY in the environment."
    };

    Json(json!({
        "status": "success",
        "data": {
            "available": configured,
            "provider": "openai",
            "model": state.llm.model,
            "configured": configured,
            "message": message,
        }
    }))
}

async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": {
            "provider": "openai",
            "model": state.llm.model,
            "maxTokens": state.llm.max_tokens,
            "configured": state.llm.configured,
        }
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/chat/stream", post(chat_stream))
        .route("/api/ai/analyze", post(analyze))
        .route("/api/ai/parse-query", post(parse_query))
        .route("/api/ai/health", get(health))
        .route("/api/ai/config", get(config))
        .with_state(state)
}

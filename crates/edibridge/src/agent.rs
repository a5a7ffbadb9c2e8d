use std::sync::Arc;

use async_stream::{stream, try_stream};
use chrono::{SecondsFormat, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::conversation::{ChatMessage, ConversationStore};
use crate::documents::DocumentClient;
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{CompletionRequest, Provider};
use crate::providers::utils::ToolCallAccumulator;
use crate::tools::{assistant_tools, run_tool, today};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistantConfig {
    /// Model requests allowed per turn
    pub max_iterations: usize,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub response: String,
    pub tools_used: Vec<String>,
}

/// Progress of a streamed turn
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    Content(String),
    Tool { name: String, args: Value },
    Done,
    Error { message: String },
}

impl AssistantEvent {
    /// The `{type, data}` frame sent to clients
    pub fn to_json(&self) -> Value {
        match self {
            AssistantEvent::Content(text) => json!({"type": "content", "data": text}),
            AssistantEvent::Tool { name, args } => {
                json!({"type": "tool", "data": {"name": name, "args": args}})
            }
            AssistantEvent::Done => json!({"type": "done", "data": null}),
            AssistantEvent::Error { message } => {
                json!({"type": "error", "data": {"message": message}})
            }
        }
    }
}

/// Tool-calling assistant over the EDI document API. Holds one conversation per id
/// and runs each turn as a bounded loop of model requests and tool executions.
pub struct Assistant {
    provider: Option<Arc<dyn Provider>>,
    documents: Arc<DocumentClient>,
    store: Arc<dyn ConversationStore>,
    config: AssistantConfig,
}

/// Every tool call of a model message, or the first malformed one
fn checked_calls(message: &Message) -> AgentResult<Vec<(String, ToolCall)>> {
    message
        .tool_requests()
        .into_iter()
        .map(|request| {
            request
                .tool_call
                .clone()
                .map(|call| (request.id.clone(), call))
        })
        .collect()
}

impl Assistant {
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        documents: Arc<DocumentClient>,
        store: Arc<dyn ConversationStore>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            provider,
            documents,
            store,
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    fn provider(&self) -> AgentResult<&Arc<dyn Provider>> {
        self.provider.as_ref().ok_or(AgentError::NotConfigured)
    }

    fn system_prompt() -> AgentResult<String> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        load_prompt_file("assistant_system.md", &json!({ "now": now }))
            .map_err(|e| AgentError::Internal(e.to_string()))
    }

    fn request<'a>(&self, messages: &'a [Message], tools: &'a [Tool]) -> CompletionRequest<'a> {
        CompletionRequest::new(messages)
            .with_tools(tools)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
    }

    /// Run one turn and return the final answer with the names of the tools executed
    pub async fn reply(&self, conversation_id: &str, text: &str) -> AgentResult<TurnResult> {
        let provider = self.provider()?;
        let handle = self
            .store
            .get_or_create(conversation_id, &Self::system_prompt()?)
            .await;
        let mut conversation = handle.lock().await;
        conversation.push(Message::user().with_text(text));

        let tools = assistant_tools(today());
        let mut tools_used = Vec::new();
        let mut response = None;
        let mut last_text = String::new();

        for iteration in 1..=self.config.max_iterations {
            info!(conversation_id, iteration, "requesting completion");
            let completion = provider
                .complete(self.request(&conversation.messages, &tools))
                .await?;
            let message = completion.message;
            last_text = message.text();

            if !message.has_tool_requests() {
                conversation.push(Message::assistant().with_text(last_text.clone()));
                response = Some(last_text.clone());
                break;
            }

            let calls = checked_calls(&message)?;
            info!(conversation_id, count = calls.len(), "model requested tool calls");
            conversation.push(message);

            for (id, call) in calls {
                tools_used.push(call.name.clone());
                let outcome = run_tool(&call, &self.documents).await;
                conversation.push(Message::tool().with_tool_response(
                    id,
                    call.name,
                    outcome.to_value(),
                ));
            }
        }

        if response.is_none() {
            warn!(
                conversation_id,
                max_iterations = self.config.max_iterations,
                "max iterations reached"
            );
        }
        conversation.touch();

        Ok(TurnResult {
            response: response.unwrap_or(last_text),
            tools_used,
        })
    }

    fn stream_turn<'a>(
        &'a self,
        conversation_id: &'a str,
        text: &'a str,
    ) -> BoxStream<'a, AgentResult<AssistantEvent>> {
        Box::pin(try_stream! {
            let provider = self.provider()?;
            let system_prompt = Self::system_prompt()?;
            let handle = self.store.get_or_create(conversation_id, &system_prompt).await;
            let mut conversation = handle.lock().await;
            conversation.push(Message::user().with_text(text));

            let tools = assistant_tools(today());
            let mut finished = false;

            for iteration in 1..=self.config.max_iterations {
                info!(conversation_id, iteration, "requesting streamed completion");
                let mut deltas = provider
                    .stream(self.request(&conversation.messages, &tools))
                    .await
                    .map_err(AgentError::from)?;

                let mut content = String::new();
                let mut calls = ToolCallAccumulator::new();
                while let Some(delta) = deltas.next().await {
                    let delta = delta.map_err(AgentError::from)?;
                    for call in &delta.tool_calls {
                        calls.push(call);
                    }
                    if let Some(part) = delta.content {
                        content.push_str(&part);
                        yield AssistantEvent::Content(part);
                    }
                }

                if calls.is_empty() {
                    conversation.push(Message::assistant().with_text(content));
                    finished = true;
                    break;
                }

                let mut message = Message::assistant();
                if !content.is_empty() {
                    message = message.with_text(content);
                }
                for request in calls.finish() {
                    message = message.with_content(request);
                }
                let checked = checked_calls(&message)?;
                conversation.push(message);

                for (id, call) in checked {
                    yield AssistantEvent::Tool {
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    };
                    let outcome = run_tool(&call, &self.documents).await;
                    conversation.push(Message::tool().with_tool_response(
                        id,
                        call.name,
                        outcome.to_value(),
                    ));
                }
            }

            if !finished {
                warn!(
                    conversation_id,
                    max_iterations = self.config.max_iterations,
                    "max iterations reached"
                );
            }
            conversation.touch();
        })
    }

    /// Run one turn, streaming text deltas and tool executions as they happen. The
    /// stream ends with `Done`, or with a single `Error` if the turn fails.
    pub fn reply_stream<'a>(
        &'a self,
        conversation_id: &'a str,
        text: &'a str,
    ) -> BoxStream<'a, AssistantEvent> {
        let mut turn = self.stream_turn(conversation_id, text);
        Box::pin(stream! {
            let mut failed = false;
            while let Some(item) = turn.next().await {
                match item {
                    Ok(event) => yield event,
                    Err(e) => {
                        warn!(conversation_id, error = %e, "streamed turn failed");
                        yield AssistantEvent::Error { message: e.to_string() };
                        failed = true;
                        break;
                    }
                }
            }
            if !failed {
                yield AssistantEvent::Done;
            }
        })
    }

    pub async fn conversation_history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.store.history(conversation_id).await
    }

    /// Forget a conversation. A turn already running on it completes against the
    /// detached copy.
    pub async fn clear_conversation(&self, conversation_id: &str) -> bool {
        self.store.remove(conversation_id).await
    }
}

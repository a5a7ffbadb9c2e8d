use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use super::base::{CompletionDelta, ToolCallDelta, Usage};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Marker closing a streamed completion
pub const STREAM_DONE: &str = "[DONE]";

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = Map::new();
        converted.insert("role".to_string(), json!(message.role.as_str()));

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text { text: part } => text.push_str(part),
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        tool_calls.push(json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&tool_call.name),
                                "arguments": tool_call.arguments.to_string(),
                            }
                        }));
                    }
                    Err(e) => {
                        output.push(json!({
                            "role": "tool",
                            "content": format!("Error: {}", e),
                            "tool_call_id": request.id
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    output.push(json!({
                        "role": "tool",
                        "tool_call_id": response.id,
                        "name": response.name,
                        "content": response.output.to_string(),
                    }));
                }
            }
        }

        // every non-tool message is sent, even when empty
        let keeps_turn = message.role != Role::Tool && tool_calls.is_empty();
        if !text.is_empty() || keeps_turn {
            converted.insert("content".to_string(), json!(text));
        }
        if !tool_calls.is_empty() {
            converted.insert("tool_calls".to_string(), json!(tool_calls));
        }

        if converted.contains_key("content") || converted.contains_key("tool_calls") {
            output.insert(0, Value::Object(converted));
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Decode the raw argument string of a tool call. Models send an empty string for
/// calls without arguments.
pub fn parse_tool_call(id: &str, name: &str, arguments: &str) -> AgentResult<ToolCall> {
    if !is_valid_function_name(name) {
        return Err(AgentError::ToolNotFound(format!(
            "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
            name
        )));
    }

    let arguments = arguments.trim();
    if arguments.is_empty() {
        return Ok(ToolCall::new(name, json!({})));
    }

    serde_json::from_str::<Value>(arguments)
        .map(|params| ToolCall::new(name, params))
        .map_err(|e| {
            AgentError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                id, e
            ))
        })
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No choices in completion response"))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            message = message.with_tool_request(id, parse_tool_call(id, name, arguments));
        }
    }

    Ok(message)
}

pub fn get_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(CompletionDelta),
    Done,
}

/// Parse one line of a streamed completion. Blank lines, comments and other
/// non-data lines yield `None`.
pub fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == STREAM_DONE {
        return Ok(Some(StreamEvent::Done));
    }

    let chunk: Value = serde_json::from_str(data)?;
    if let Some(error) = chunk.get("error") {
        return Err(anyhow!("OpenAI API error: {}", error));
    }

    let Some(delta) = chunk
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("delta"))
    else {
        return Ok(None);
    };

    let content = delta
        .get("content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(String::from);

    let tool_calls = delta
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(position, call)| ToolCallDelta {
                    index: call
                        .get("index")
                        .and_then(|i| i.as_u64())
                        .map(|i| i as usize)
                        .unwrap_or(position),
                    id: call.get("id").and_then(|v| v.as_str()).map(String::from),
                    name: call["function"]
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    arguments: call["function"]
                        .get("arguments")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(StreamEvent::Delta(CompletionDelta {
        content,
        tool_calls,
    })))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles streamed tool call fragments, keyed by their index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        if let Some(id) = &delta.id {
            call.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            call.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            call.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order, ready to attach to an assistant message
    pub fn finish(self) -> Vec<MessageContent> {
        self.calls
            .into_values()
            .map(|call| {
                let tool_call = parse_tool_call(&call.id, &call.name, &call.arguments);
                MessageContent::tool_request(call.id, tool_call)
            })
            .collect()
    }
}

/// Only for messages sent back to the model; names coming from the model are validated
pub fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_function_name_char(c) { c } else { '_' })
        .collect()
}

pub fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_function_name_char)
}

fn is_function_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Roles accepted on the wire from clients of the stateless chat endpoints
pub fn client_message(role: &str, content: &str) -> Option<Message> {
    Role::from_client(role).map(|role| Message::new(role).with_text(content))
}

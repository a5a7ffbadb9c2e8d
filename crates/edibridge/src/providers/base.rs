use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One request to the model. The conversation is sent as is, including any leading
/// system message. When tools are present the model chooses freely between
/// answering and calling them.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [Tool],
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: &[],
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: &'a [Tool]) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub message: Message,
    pub usage: Usage,
    pub model: String,
}

/// A fragment of a tool call as streamed by the model. Fragments sharing an index
/// belong to the same call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Base trait for hosted model providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the model requests are sent to
    fn model(&self) -> &str;

    /// Generate the next message for the conversation
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion>;

    /// Generate the next message incrementally
    async fn stream(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<BoxStream<'static, Result<CompletionDelta>>>;
}

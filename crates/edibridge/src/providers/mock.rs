use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::{Message, MessageContent};
use crate::providers::base::{
    Completion, CompletionDelta, CompletionRequest, Provider, ToolCallDelta, Usage,
};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    fallback: Option<Message>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every request with the same message
    pub fn repeating(message: Message) -> Self {
        Self {
            fallback: Some(message),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversations received so far, one entry per call
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self, request: &CompletionRequest<'_>) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.messages.to_vec());

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return Ok(responses.remove(0));
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("mock provider has no more responses"))
    }
}

fn message_to_deltas(message: Message) -> Vec<CompletionDelta> {
    let mut deltas = Vec::new();
    let mut index = 0;
    for content in message.content {
        match content {
            MessageContent::Text { text } => deltas.push(CompletionDelta {
                content: Some(text),
                tool_calls: vec![],
            }),
            MessageContent::ToolRequest(request) => {
                let (name, arguments) = match request.tool_call {
                    Ok(call) => (call.name, call.arguments.to_string()),
                    Err(_) => ("broken".to_string(), "{".to_string()),
                };
                deltas.push(CompletionDelta {
                    content: None,
                    tool_calls: vec![ToolCallDelta {
                        index,
                        id: Some(request.id),
                        name: Some(name),
                        arguments: Some(arguments),
                    }],
                });
                index += 1;
            }
            MessageContent::ToolResponse(_) => {}
        }
    }
    deltas
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        let message = self.next(&request)?;
        Ok(Completion {
            message,
            usage: Usage::default(),
            model: self.model().to_string(),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        let message = self.next(&request)?;
        let deltas = message_to_deltas(message);
        Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
    }
}

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{Completion, CompletionDelta, CompletionRequest, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    get_usage, messages_to_openai_spec, openai_response_to_message, parse_stream_line,
    tools_to_openai_spec, StreamEvent,
};
use crate::errors::AgentError;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    api_key: String,
}

impl OpenAiProvider {
    /// Fails with [`AgentError::NotConfigured`] when the config carries no usable key
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .map(String::from)
            .ok_or(AgentError::NotConfigured)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &OpenAiProviderConfig {
        &self.config
    }

    fn payload(&self, request: &CompletionRequest<'_>, stream: bool) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert(
            "messages".to_string(),
            json!(messages_to_openai_spec(request.messages)),
        );

        if !request.tools.is_empty() {
            payload.insert(
                "tools".to_string(),
                json!(tools_to_openai_spec(request.tools)?),
            );
            payload.insert("tool_choice".to_string(), json!("auto"));
        }
        if let Some(temp) = request.temperature.or(self.config.temperature) {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = request.max_tokens.or(self.config.max_tokens) {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        if stream {
            payload.insert("stream".to_string(), json!(true));
        }

        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: &Value) -> Result<Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\n{}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        let payload = self.payload(&request, false)?;
        debug!(model = %self.config.model, messages = request.messages.len(), "requesting completion");

        let response: Value = self.post(&payload).await?.json().await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = get_usage(&response);
        let model = response
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(self.config.model.as_str())
            .to_string();

        Ok(Completion {
            message,
            usage,
            model,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        let payload = self.payload(&request, true)?;
        debug!(model = %self.config.model, messages = request.messages.len(), "requesting streamed completion");

        let response = self.post(&payload).await?;

        let stream = try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                buffer.extend_from_slice(&chunk?);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_stream_line(&String::from_utf8_lossy(&line))? {
                        Some(StreamEvent::Delta(delta)) => yield delta,
                        Some(StreamEvent::Done) => break 'read,
                        None => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::tool::Tool;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: String) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host,
            api_key: Some("test_api_key".to_string()),
            model: "gpt-4o".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(4000),
        }
    }

    async fn setup_mock_server(response_body: Value) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    fn search_tool() -> Tool {
        Tool::new(
            "searchDocuments",
            "Search EDI documents",
            json!({
                "type": "object",
                "properties": {
                    "documentType": {"type": "string"}
                }
            }),
        )
    }

    #[test]
    fn test_new_requires_key() {
        let mut config = config("http://localhost".to_string());
        config.api_key = None;
        let err = OpenAiProvider::new(config).err().unwrap();
        assert_eq!(
            err.downcast_ref::<AgentError>(),
            Some(&AgentError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_server, provider) = setup_mock_server(response_body).await;
        let messages = vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("Hello?"),
        ];

        let completion = provider
            .complete(CompletionRequest::new(&messages))
            .await?;

        assert_eq!(completion.message.text(), "Hello! How can I assist you today?");
        assert_eq!(completion.model, "gpt-4o-2024-08-06");
        assert_eq!(completion.usage.input_tokens, Some(12));
        assert_eq!(completion.usage.output_tokens, Some(15));
        assert_eq!(completion.usage.total_tokens, Some(27));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_sends_tools_and_overrides() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "tool_choice": "auto",
                "temperature": 0.3,
                "max_tokens": 8000,
                "tools": [{"type": "function", "function": {"name": "searchDocuments"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_123",
                            "type": "function",
                            "function": {
                                "name": "searchDocuments",
                                "arguments": "{\"documentType\":\"810\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 15, "total_tokens": 35}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Show me invoices")];
        let tools = vec![search_tool()];

        let completion = provider
            .complete(
                CompletionRequest::new(&messages)
                    .with_tools(&tools)
                    .with_temperature(0.3)
                    .with_max_tokens(8000),
            )
            .await?;

        let request = completion.message.tool_requests()[0];
        assert_eq!(request.id, "call_123");
        let tool_call = request.tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name, "searchDocuments");
        assert_eq!(tool_call.arguments, json!({"documentType": "810"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config(mock_server.uri())).unwrap();
        let messages = vec![Message::user().with_text("hi")];
        let err = provider
            .complete(CompletionRequest::new(&messages))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_complete_error_body() {
        let (_server, provider) = setup_mock_server(json!({
            "error": {"message": "quota exceeded", "code": "insufficient_quota"}
        }))
        .await;
        let messages = vec![Message::user().with_text("hi")];
        let err = provider
            .complete(CompletionRequest::new(&messages))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_stream_text_and_tool_fragments() -> Result<()> {
        let body = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant","content":"Let me "}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"check."}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"getInvoiceByNumber","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"invoiceNumber\":\"406412\"}"}}]}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"index":0,"delta":{"content":"ignored"}}]}"#,
        ]
        .join("\n\n")
            + "\n\n";

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Find invoice 406412")];
        let deltas: Vec<CompletionDelta> = provider
            .stream(CompletionRequest::new(&messages))
            .await?
            .try_collect()
            .await?;

        assert_eq!(deltas.len(), 4);
        let text: String = deltas.iter().filter_map(|d| d.content.clone()).collect();
        assert_eq!(text, "Let me check.");
        assert_eq!(deltas[2].tool_calls[0].name.as_deref(), Some("getInvoiceByNumber"));
        assert_eq!(
            deltas[3].tool_calls[0].arguments.as_deref(),
            Some(r#"{"invoiceNumber":"406412"}"#)
        );
        Ok(())
    }
}

//! Stateless model features: context-aware chat, document analysis and
//! natural-language query parsing.
use std::sync::Arc;

use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::documents::{DocumentClient, DocumentQuery};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{CompletionRequest, Provider, Usage};

const CHAT_TEMPERATURE: f64 = 0.7;
const ANALYSIS_TEMPERATURE: f64 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 8000;
const PARSE_TEMPERATURE: f64 = 0.1;
const PARSE_MAX_TOKENS: u32 = 500;
const CONTEXT_PAGE_SIZE: u32 = 50;
const CONTEXT_SAMPLE_SIZE: usize = 5;
const NO_RESPONSE: &str = "No response generated";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub content: String,
    pub usage: Usage,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis: Value,
    pub usage: Usage,
    pub model: String,
    pub document_count: usize,
}

pub struct Analyst {
    provider: Option<Arc<dyn Provider>>,
    documents: Arc<DocumentClient>,
    max_tokens: u32,
}

impl Analyst {
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        documents: Arc<DocumentClient>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            documents,
            max_tokens,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> AgentResult<&Arc<dyn Provider>> {
        self.provider.as_ref().ok_or(AgentError::NotConfigured)
    }

    /// Summary of recent traffic handed to the model as background
    async fn edi_context(&self) -> Option<Value> {
        let query = DocumentQuery {
            page_size: Some(CONTEXT_PAGE_SIZE),
            ..Default::default()
        }
        .with_analysis_defaults();

        match self.documents.fetch(&query).await {
            Ok(page) => Some(json!({
                "totalDocuments": page.total_count,
                "recentDocuments": page.data.len(),
                "summary": format!("{} recent EDI transactions", page.data.len()),
                "sampleDocuments": page.data.iter().take(CONTEXT_SAMPLE_SIZE).collect::<Vec<_>>(),
            })),
            Err(e) => {
                warn!(error = %e, "failed to fetch EDI context");
                None
            }
        }
    }

    /// Answer one message given the prior history, optionally with a summary of
    /// recent documents in the system prompt
    pub async fn chat(
        &self,
        message: &str,
        history: Vec<Message>,
        include_edi_context: bool,
    ) -> AgentResult<ChatReply> {
        let provider = self.provider()?;

        let context = if include_edi_context {
            self.edi_context().await
        } else {
            None
        };
        let context = context
            .map(|value| serde_json::to_string_pretty(&value))
            .transpose()
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let system = load_prompt_file("edi_chat.md", &json!({ "context": context }))
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system().with_text(system));
        messages.extend(history);
        messages.push(Message::user().with_text(message));

        info!(count = messages.len(), "sending chat request");
        let completion = provider
            .complete(
                CompletionRequest::new(&messages)
                    .with_temperature(CHAT_TEMPERATURE)
                    .with_max_tokens(self.max_tokens),
            )
            .await?;

        let mut content = completion.message.text();
        if content.is_empty() {
            content = NO_RESPONSE.to_string();
        }
        Ok(ChatReply {
            content,
            usage: completion.usage,
            model: completion.model,
        })
    }

    /// Stream the model's text for a client-supplied conversation
    pub async fn chat_stream(
        &self,
        messages: Vec<Message>,
    ) -> AgentResult<BoxStream<'static, AgentResult<String>>> {
        let provider = self.provider()?;
        info!(count = messages.len(), "streaming chat request");

        let deltas = provider
            .stream(
                CompletionRequest::new(&messages)
                    .with_temperature(CHAT_TEMPERATURE)
                    .with_max_tokens(self.max_tokens),
            )
            .await?;

        Ok(deltas
            .filter_map(|delta| async move {
                match delta {
                    Ok(delta) => delta.content.filter(|c| !c.is_empty()).map(Ok),
                    Err(e) => Some(Err(AgentError::from(e))),
                }
            })
            .boxed())
    }

    /// Business analysis of the documents matching `query`, as the JSON the model returns
    pub async fn analyze(&self, query: DocumentQuery) -> AgentResult<Analysis> {
        let provider = self.provider()?;
        let page = self.documents.fetch(&query.with_analysis_defaults()).await?;
        if !page.successful || page.data.is_empty() {
            return Err(AgentError::NoDocuments);
        }
        info!(count = page.data.len(), "analyzing documents");

        let documents =
            serde_json::to_string_pretty(&page).map_err(|e| AgentError::Internal(e.to_string()))?;
        let prompt = load_prompt_file("analysis.md", &json!({ "documents": documents }))
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let messages = vec![Message::user().with_text(prompt)];

        let completion = provider
            .complete(
                CompletionRequest::new(&messages)
                    .with_temperature(ANALYSIS_TEMPERATURE)
                    .with_max_tokens(ANALYSIS_MAX_TOKENS),
            )
            .await?;

        let text = completion.message.text();
        let body = fenced_json(&text).unwrap_or(text.as_str());
        let analysis: Value =
            serde_json::from_str(body).map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        Ok(Analysis {
            analysis,
            usage: completion.usage,
            model: completion.model,
            document_count: page.data.len(),
        })
    }

    /// Turn a natural-language request into document filters
    pub async fn parse_query(&self, text: &str) -> AgentResult<DocumentQuery> {
        let provider = self.provider()?;
        let now = Utc::now();
        let system = load_prompt_file(
            "parse_query.md",
            &json!({
                "today": now.format("%Y-%m-%d").to_string(),
                "today_long": now.format("%A, %B %-d, %Y").to_string(),
            }),
        )
        .map_err(|e| AgentError::Internal(e.to_string()))?;

        let messages = vec![
            Message::system().with_text(system),
            Message::user().with_text(text),
        ];
        let completion = provider
            .complete(
                CompletionRequest::new(&messages)
                    .with_temperature(PARSE_TEMPERATURE)
                    .with_max_tokens(PARSE_MAX_TOKENS),
            )
            .await
            .map_err(|e| AgentError::QueryParse(e.to_string()))?;

        let mut response = completion.message.text();
        if response.trim().is_empty() {
            response = "{}".to_string();
        }
        info!(response = %response, "parsed search query");

        let query: DocumentQuery = serde_json::from_str(query_json(&response))
            .map_err(|e| AgentError::QueryParse(e.to_string()))?;
        Ok(query.with_analysis_defaults())
    }
}

/// Body of the first ```json fenced block
fn fenced_json(text: &str) -> Option<&str> {
    let fence = Regex::new(r"```json\s*([\s\S]*?)\s*```").ok()?;
    fence
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// The JSON object in a model reply, fenced or surrounded by prose
fn query_json(text: &str) -> &str {
    if let Some(body) = fenced_json(text) {
        return body;
    }
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DocumentClientConfig;
    use crate::models::role::Role;
    use crate::providers::mock::MockProvider;

    fn analyst_with(provider: Arc<MockProvider>) -> Analyst {
        Analyst::new(
            Some(provider),
            Arc::new(DocumentClient::new(DocumentClientConfig::mock())),
            4000,
        )
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(fenced_json(text), Some("{\"a\": 1}"));
        assert_eq!(fenced_json("{\"a\": 1}"), None);
    }

    #[test]
    fn test_query_json() {
        assert_eq!(
            query_json("Sure! {\"documentType\":\"810\"} hope that helps"),
            "{\"documentType\":\"810\"}"
        );
        assert_eq!(query_json("```json\n{\"x\":1}\n```"), "{\"x\":1}");
        assert_eq!(query_json("  nothing here "), "nothing here");
    }

    #[tokio::test]
    async fn test_chat_with_context() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("You have 5 recent transactions.")
        ]));
        let analyst = analyst_with(provider.clone());

        let history = vec![
            Message::user().with_text("hi"),
            Message::assistant().with_text("hello"),
        ];
        let reply = analyst
            .chat("How many documents?", history, true)
            .await
            .unwrap();
        assert_eq!(reply.content, "You have 5 recent transactions.");
        assert_eq!(reply.model, "mock-model");

        let sent = &provider.requests()[0];
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].text().contains("Current EDI Data Context"));
        assert!(sent[0].text().contains("\"totalDocuments\": 5"));
        assert_eq!(sent[3].text(), "How many documents?");
    }

    #[tokio::test]
    async fn test_chat_without_context_and_empty_reply() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant()]));
        let analyst = analyst_with(provider.clone());

        let reply = analyst.chat("hello", vec![], false).await.unwrap();
        assert_eq!(reply.content, "No response generated");
        assert!(!provider.requests()[0][0]
            .text()
            .contains("Current EDI Data Context"));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let analyst = Analyst::new(
            None,
            Arc::new(DocumentClient::new(DocumentClientConfig::mock())),
            4000,
        );
        assert!(!analyst.is_configured());
        assert_eq!(
            analyst.chat("hello", vec![], false).await.unwrap_err(),
            AgentError::NotConfigured
        );
        assert!(analyst.chat_stream(vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_chat_stream_yields_text() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant()
            .with_text("EDI ")
            .with_text("is great")]));
        let analyst = analyst_with(provider);

        let chunks: Vec<String> = analyst
            .chat_stream(vec![Message::user().with_text("What is EDI?")])
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["EDI ".to_string(), "is great".to_string()]);
    }

    #[tokio::test]
    async fn test_analyze() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant().with_text(
            "```json\n{\"executiveSummary\": {\"totalDocuments\": 1}}\n```",
        )]));
        let analyst = analyst_with(provider.clone());

        let analysis = analyst
            .analyze(DocumentQuery {
                transaction_status: Some("ERROR".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(analysis.document_count, 1);
        assert_eq!(analysis.analysis["executiveSummary"]["totalDocuments"], 1);

        let prompt = provider.requests()[0][0].text();
        assert!(prompt.contains("Now analyze the following EDI document data"));
        assert!(prompt.contains("\"transactionStatus\": \"ERROR\""));
    }

    #[tokio::test]
    async fn test_analyze_without_documents() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let analyst = analyst_with(provider.clone());

        let err = analyst
            .analyze(DocumentQuery {
                destination: Some("nobody".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::NoDocuments);
        assert_eq!(err.to_string(), "No documents found for analysis");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_invalid_json() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("I could not analyze that.")
        ]));
        let analyst = analyst_with(provider);

        let err = analyst.analyze(DocumentQuery::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_parse_query() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant().with_text(
            "{\"destination\":\"maxxmart\",\"documentType\":\"810\",\"sortDir\":\"asc\"}",
        )]));
        let analyst = analyst_with(provider.clone());

        let query = analyst
            .parse_query("invoices sent to maxxmart, oldest first")
            .await
            .unwrap();
        assert_eq!(query.destination.as_deref(), Some("maxxmart"));
        assert_eq!(query.document_type.as_deref(), Some("810"));
        assert_eq!(query.select_filtered.as_deref(), Some("Y"));
        assert_eq!(query.with_notes, Some(true));
        assert_eq!(query.sort_by.as_deref(), Some("transactionLastDateTime"));

        let sent = &provider.requests()[0];
        assert!(sent[0].text().contains("Current Date: "));
        assert_eq!(sent[1].text(), "invoices sent to maxxmart, oldest first");
    }

    #[tokio::test]
    async fn test_parse_query_accepts_numeric_document_type() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant().with_text(
            "{\"documentType\":810,\"destination\":\"maxxmart\"}",
        )]));
        let analyst = analyst_with(provider);

        let query = analyst.parse_query("invoices sent to maxxmart").await.unwrap();
        assert_eq!(query.document_type.as_deref(), Some("810"));
        assert_eq!(query.destination.as_deref(), Some("maxxmart"));
        assert_eq!(query.select_filtered.as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn test_parse_query_failures() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant(),
            Message::assistant().with_text("no idea"),
        ]));
        let analyst = analyst_with(provider);

        // an empty reply means no filters
        let query = analyst.parse_query("anything").await.unwrap();
        assert_eq!(query, DocumentQuery::default().with_analysis_defaults());

        let err = analyst.parse_query("gibberish").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse search query: "));
    }
}

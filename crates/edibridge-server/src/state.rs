use std::sync::Arc;
use std::time::Instant;

use edibridge::agent::Assistant;
use edibridge::analyst::Analyst;
use edibridge::conversation::InMemoryConversationStore;
use edibridge::documents::DocumentClient;
use edibridge::providers::base::Provider;
use edibridge::providers::openai::OpenAiProvider;

use crate::configuration::Settings;

/// What the AI endpoints report about the configured model
#[derive(Debug, Clone)]
pub struct LlmInfo {
    pub model: String,
    pub max_tokens: u32,
    pub configured: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentClient>,
    pub assistant: Arc<Assistant>,
    pub analyst: Arc<Analyst>,
    pub llm: LlmInfo,
    pub stream_done: String,
    pub environment: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Self {
        let provider = match OpenAiProvider::new(settings.llm.provider_config()) {
            Ok(provider) => {
                tracing::info!(model = %settings.llm.model, "model provider initialized");
                Some(Arc::new(provider) as Arc<dyn Provider>)
            }
            Err(e) => {
                tracing::warn!("{}. AI features will be disabled.", e);
                None
            }
        };
        Self::with_provider(settings, provider)
    }

    /// State over an already built provider, or none when AI is disabled
    pub fn with_provider(settings: &Settings, provider: Option<Arc<dyn Provider>>) -> Self {
        let documents = Arc::new(DocumentClient::new(settings.edi.client_config()));
        let assistant = Assistant::new(
            provider.clone(),
            documents.clone(),
            Arc::new(InMemoryConversationStore::new()),
            settings.assistant.assistant_config(),
        );
        let analyst = Analyst::new(provider.clone(), documents.clone(), settings.llm.max_tokens);

        Self {
            documents,
            assistant: Arc::new(assistant),
            analyst: Arc::new(analyst),
            llm: LlmInfo {
                model: settings.llm.model.clone(),
                max_tokens: settings.llm.max_tokens,
                configured: provider.is_some(),
            },
            stream_done: settings.assistant.done_sentinel.clone(),
            environment: settings.server.environment.clone(),
            started_at: Instant::now(),
        }
    }
}

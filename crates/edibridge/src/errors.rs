use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("OpenAI API key not configured. Please set EDIBRIDGE_LLM__API_KEY in your environment.")]
    NotConfigured,

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The document API failed while gathering data for the model
    #[error("{0}")]
    Documents(String),

    #[error("No documents found for analysis")]
    NoDocuments,

    #[error("Failed to parse model response: {0}")]
    InvalidResponse(String),

    #[error("Failed to parse search query: {0}")]
    QueryParse(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<anyhow::Error> for AgentError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<AgentError>() {
            Ok(agent_error) => agent_error,
            Err(other) => AgentError::Provider(other.to_string()),
        }
    }
}

impl From<DocumentError> for AgentError {
    fn from(error: DocumentError) -> Self {
        AgentError::Documents(error.to_string())
    }
}

/// Failures of the EDI document API client
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invoice number is required")]
    MissingInvoiceNumber,

    #[error("Invalid EDI API base URL: {0}")]
    InvalidUrl(String),

    #[error("Cannot connect to external EDI API. Please verify the API is running and accessible.")]
    Connect(#[source] reqwest::Error),

    #[error("External API error: {status}")]
    Upstream { status: StatusCode },

    #[error("External API returned non-JSON response (content-type: {content_type})")]
    NonJson { content_type: String },

    #[error("Failed to decode external API response: {0}")]
    Decode(String),
}

impl DocumentError {
    /// Client input errors, as opposed to upstream failures
    pub fn is_validation(&self) -> bool {
        matches!(self, DocumentError::MissingInvoiceNumber)
    }
}

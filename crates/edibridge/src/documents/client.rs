use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, error, info};
use url::Url;

use super::mock::mock_page;
use super::query::DocumentQuery;
use super::types::{DocumentPage, ExternalDocumentResponse};
use crate::errors::DocumentError;

const DOCS_PATH: &str = "v1/1/docs";
const BODY_EXCERPT: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentClientConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_mock_data: bool,
}

impl DocumentClientConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            use_mock_data: false,
        }
    }

    pub fn mock() -> Self {
        Self {
            use_mock_data: true,
            ..Self::new("http://localhost")
        }
    }

    pub fn with_credentials<S: Into<String>>(mut self, username: S, password: S) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Basic auth pair, only when both parts are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// Read-only client for the external EDI document API
pub struct DocumentClient {
    client: Client,
    config: DocumentClientConfig,
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

impl DocumentClient {
    pub fn new(config: DocumentClientConfig) -> Self {
        if config.use_mock_data {
            info!("document client running in mock data mode");
        }
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &DocumentClientConfig {
        &self.config
    }

    pub fn is_mock(&self) -> bool {
        self.config.use_mock_data
    }

    fn url(&self, query: &DocumentQuery) -> Result<Url, DocumentError> {
        let base = format!("{}/{}", self.config.base_url.trim_end_matches('/'), DOCS_PATH);
        let mut url = Url::parse(&base).map_err(|e| DocumentError::InvalidUrl(e.to_string()))?;

        let query_string = query
            .to_query_string()
            .map_err(|e| DocumentError::InvalidUrl(e.to_string()))?;
        if !query_string.is_empty() {
            url.set_query(Some(&query_string));
        }
        Ok(url)
    }

    /// Run a document search and return the trimmed page
    pub async fn fetch(&self, query: &DocumentQuery) -> Result<DocumentPage, DocumentError> {
        if self.config.use_mock_data {
            debug!(?query, "returning mock documents");
            return Ok(mock_page(query));
        }

        let url = self.url(query)?;
        info!(%url, "fetching documents");

        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some((user, pass)) = self.config.credentials() {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "failed to reach EDI API");
            DocumentError::Connect(e)
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        debug!(%status, ?content_type, "EDI API responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = excerpt(&body), "EDI API returned an error");
            return Err(DocumentError::Upstream { status });
        }

        let content_type = match content_type {
            Some(ct) if ct.contains("application/json") => ct,
            other => {
                let body = response.text().await.unwrap_or_default();
                let content_type = other.unwrap_or_else(|| "null".to_string());
                error!(%content_type, body = excerpt(&body), "expected JSON from EDI API");
                return Err(DocumentError::NonJson { content_type });
            }
        };

        let external: ExternalDocumentResponse = response.json().await.map_err(|e| {
            error!(error = %e, %content_type, "failed to decode EDI API response");
            DocumentError::Decode(e.to_string())
        })?;
        info!(count = external.data.len(), "fetched documents");

        Ok(DocumentPage::from(external))
    }

    /// Look up an invoice by its number
    pub async fn find_invoice(&self, invoice_number: &str) -> Result<DocumentPage, DocumentError> {
        let invoice_number = invoice_number.trim();
        if invoice_number.is_empty() {
            return Err(DocumentError::MissingInvoiceNumber);
        }
        info!(invoice_number, "searching for invoice");
        self.fetch(&DocumentQuery::for_invoice(invoice_number)).await
    }
}

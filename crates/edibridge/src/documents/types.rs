use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::INVOICE_NUMBER_EXTENSION;

/// Envelope returned by the upstream document API. Only the fields this service
/// reads are typed; everything else in the payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalDocumentResponse {
    pub errors: Vec<String>,
    pub messages: Vec<String>,
    pub successful: bool,
    pub current_page: u32,
    pub total_count: u64,
    pub data: Vec<ExternalDocument>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalDocument {
    pub wfid: i64,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub destination_id: Option<String>,
    pub destination_name: Option<String>,
    pub document_type: Option<String>,
    pub reference: Option<String>,
    pub document_status: Option<String>,
    pub transaction_status: Option<String>,
    pub transaction_status_reason: Option<String>,
    pub direction: Option<String>,
    pub document_creation_date: Option<i64>,
    pub transaction_last_date_time: Option<i64>,
    pub inbound_message_filename: Option<String>,
    pub outbound_message_filename: Option<String>,
    pub interchange_number: Option<String>,
    pub group_number: Option<String>,
    pub transaction_number: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub doc_extensions: Vec<DocExtension>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<DocExtension>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<DocExtension>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One document extension. The upstream uses two spellings for the key and
/// value fields depending on the endpoint version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocExtension {
    pub name: Option<String>,
    pub extension_name: Option<String>,
    pub value: Option<Value>,
    pub extension_value: Option<Value>,
}

impl DocExtension {
    fn is_named(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.extension_name.as_deref() == Some(key)
    }

    fn value_string(&self) -> Option<String> {
        [&self.value, &self.extension_value]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Value of the first `INVOICE_NUMBER` extension, if any
pub fn extract_invoice_number(extensions: &[DocExtension]) -> Option<String> {
    extensions
        .iter()
        .find(|ext| ext.is_named(INVOICE_NUMBER_EXTENSION))
        .and_then(DocExtension::value_string)
}

/// The trimmed view of a document exposed to clients and to the assistant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub wfid: i64,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub destination_id: Option<String>,
    pub destination_name: Option<String>,
    pub document_type: Option<String>,
    pub reference: Option<String>,
    pub document_status: Option<String>,
    pub transaction_status: Option<String>,
    pub transaction_status_reason: Option<String>,
    pub direction: Option<String>,
    pub document_creation_date: Option<i64>,
    pub transaction_last_date_time: Option<i64>,
    pub inbound_message_filename: Option<String>,
    pub outbound_message_filename: Option<String>,
    pub interchange_number: Option<String>,
    pub group_number: Option<String>,
    pub transaction_number: Option<String>,
    pub invoice_number: Option<String>,
}

impl From<&ExternalDocument> for DocumentSummary {
    fn from(doc: &ExternalDocument) -> Self {
        DocumentSummary {
            wfid: doc.wfid,
            source_id: doc.source_id.clone(),
            source_name: doc.source_name.clone(),
            destination_id: doc.destination_id.clone(),
            destination_name: doc.destination_name.clone(),
            document_type: doc.document_type.clone(),
            reference: doc.reference.clone(),
            document_status: doc.document_status.clone(),
            transaction_status: doc.transaction_status.clone(),
            transaction_status_reason: doc.transaction_status_reason.clone(),
            direction: doc.direction.clone(),
            document_creation_date: doc.document_creation_date,
            transaction_last_date_time: doc.transaction_last_date_time,
            inbound_message_filename: doc.inbound_message_filename.clone(),
            outbound_message_filename: doc.outbound_message_filename.clone(),
            interchange_number: doc.interchange_number.clone(),
            group_number: doc.group_number.clone(),
            transaction_number: doc.transaction_number.clone(),
            invoice_number: extract_invoice_number(&doc.doc_extensions),
        }
    }
}

/// Response envelope for a page of trimmed documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub errors: Vec<String>,
    pub messages: Vec<String>,
    pub successful: bool,
    pub current_page: u32,
    pub total_count: u64,
    pub data: Vec<DocumentSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl DocumentPage {
    /// An unsuccessful, empty page carrying the given errors and messages
    pub fn failure(errors: Vec<String>, messages: Vec<String>) -> Self {
        DocumentPage {
            errors,
            messages,
            successful: false,
            current_page: 1,
            total_count: 0,
            data: Vec::new(),
            api_version: None,
        }
    }
}

impl From<ExternalDocumentResponse> for DocumentPage {
    fn from(external: ExternalDocumentResponse) -> Self {
        DocumentPage {
            data: external.data.iter().map(DocumentSummary::from).collect(),
            errors: external.errors,
            messages: external.messages,
            successful: external.successful,
            current_page: external.current_page,
            total_count: external.total_count,
            api_version: external.api_version,
        }
    }
}

//! Tools the assistant model may call, and their execution against the document client
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::documents::{DocumentClient, DocumentQuery};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

pub const GET_INVOICE_BY_NUMBER: &str = "getInvoiceByNumber";
pub const SEARCH_DOCUMENTS: &str = "searchDocuments";

/// The two document tools, with today's date embedded in the search description
pub fn assistant_tools(today: NaiveDate) -> Vec<Tool> {
    vec![get_invoice_by_number_tool(), search_documents_tool(today)]
}

fn get_invoice_by_number_tool() -> Tool {
    Tool::new(
        GET_INVOICE_BY_NUMBER,
        "Retrieve detailed information about an invoice by its invoice number. \
         Use this when the user asks about a specific invoice.",
        json!({
            "type": "object",
            "properties": {
                "invoiceNumber": {
                    "type": "string",
                    "description": "The invoice number to search for (e.g., \"22406412_3285897\" or \"406412\")"
                }
            },
            "required": ["invoiceNumber"]
        }),
    )
}

fn search_documents_tool(today: NaiveDate) -> Tool {
    let description = format!(
        "Search for EDI documents with flexible filtering. Use this when users ask about documents, \
transactions, or want summaries over time periods.

IMPORTANT Date Handling:
- If user mentions \"last X days/weeks/months\", calculate startDate and endDate automatically
- Today is {today}
- Examples:
  * \"last 2 weeks\" = startDate: 14 days ago, endDate: today
  * \"last month\" = startDate: 30 days ago, endDate: today
  * \"this week\" = startDate: Monday of this week, endDate: today

IMPORTANT: If critical parameters are ambiguous or missing (like specific trading partner when user \
asks \"documents from partner X\"), ask the user for clarification before calling this function.",
        today = today.format("%Y-%m-%d")
    );

    Tool::new(
        SEARCH_DOCUMENTS,
        description,
        json!({
            "type": "object",
            "properties": {
                "documentType": {
                    "type": "string",
                    "description": "Document type code. 810=Invoice, 850=Purchase Order (PO), 856=Advanced Shipping Notice (ASN), 997=Functional Acknowledgment. Leave empty to search all types.",
                    "enum": ["810", "850", "856", "997"]
                },
                "source": {
                    "type": "string",
                    "description": "Source trading partner ID (the sender). Use this when user asks about documents FROM a specific partner."
                },
                "destination": {
                    "type": "string",
                    "description": "Destination trading partner ID (the receiver). Use this when user asks about documents TO a specific partner."
                },
                "transactionStatus": {
                    "type": "string",
                    "description": "Transaction status filter. Options: SENT (successfully sent), RECEIVED (successfully received), ERROR (failed with error), IN_PROGRESS (currently processing), ERROR-HANDLED (error was resolved). Leave empty to search all statuses.",
                    "enum": ["SENT", "RECEIVED", "ERROR", "IN_PROGRESS", "ERROR-HANDLED"]
                },
                "startDate": {
                    "type": "string",
                    "description": "Start date in ISO 8601 timestamp format (YYYY-MM-DDTHH:mm:ss.sssZ). Example: 2025-12-01T00:00:00.000Z. Set time to 00:00:00.000Z for start of day."
                },
                "endDate": {
                    "type": "string",
                    "description": "End date in ISO 8601 timestamp format (YYYY-MM-DDTHH:mm:ss.sssZ). Example: 2025-12-14T23:59:59.999Z. Set time to 23:59:59.999Z for end of day. Typically today's date unless user specifies otherwise."
                },
                "pageSize": {
                    "type": "number",
                    "description": "Maximum number of documents to return. Default is 50. Use 100 for \"all\" or \"full list\" requests."
                }
            },
            "required": []
        }),
    )
}

/// A tool call decoded into its typed arguments
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    GetInvoiceByNumber { invoice_number: String },
    SearchDocuments(DocumentQuery),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceArgs {
    #[serde(default)]
    invoice_number: Option<Value>,
}

impl ToolInvocation {
    pub fn parse(call: &ToolCall) -> AgentResult<Self> {
        match call.name.as_str() {
            GET_INVOICE_BY_NUMBER => {
                let args: InvoiceArgs = serde_json::from_value(call.arguments.clone())
                    .map_err(|e| AgentError::InvalidParameters(e.to_string()))?;
                // A missing number is reported by the document client, like any other lookup
                let invoice_number = match args.invoice_number {
                    Some(Value::String(s)) => s,
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => {
                        return Err(AgentError::InvalidParameters(format!(
                            "invoiceNumber must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(ToolInvocation::GetInvoiceByNumber { invoice_number })
            }
            SEARCH_DOCUMENTS => serde_json::from_value(call.arguments.clone())
                .map(ToolInvocation::SearchDocuments)
                .map_err(|e| AgentError::InvalidParameters(e.to_string())),
            other => Err(AgentError::ToolNotFound(other.to_string())),
        }
    }

    pub async fn execute(&self, documents: &DocumentClient) -> ToolOutcome {
        let result = match self {
            ToolInvocation::GetInvoiceByNumber { invoice_number } => {
                documents.find_invoice(invoice_number).await
            }
            ToolInvocation::SearchDocuments(query) => documents.fetch(query).await,
        };

        match result {
            Ok(page) => match serde_json::to_value(&page) {
                Ok(data) => ToolOutcome::success(data),
                Err(e) => ToolOutcome::failure(e.to_string()),
            },
            Err(e) => {
                warn!(error = %e, "tool execution failed");
                ToolOutcome::failure(e.to_string())
            }
        }
    }
}

/// Result of one tool execution as reported back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        json!(self)
    }
}

/// Parse and run one tool call. Every failure, including unknown tools and
/// mismatched arguments, is folded into an unsuccessful outcome.
pub async fn run_tool(call: &ToolCall, documents: &DocumentClient) -> ToolOutcome {
    info!(tool = %call.name, args = %call.arguments, "executing tool");
    match ToolInvocation::parse(call) {
        Ok(invocation) => invocation.execute(documents).await,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "rejected tool call");
            ToolOutcome::failure(e.to_string())
        }
    }
}

/// Today's date used when building tool descriptions
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

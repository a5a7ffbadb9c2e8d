//! Client for the external EDI document-tracking API
//!
//! The upstream returns very large per-document records. Everything leaving this
//! module is trimmed down to [`DocumentSummary`] inside a [`DocumentPage`] envelope.
pub mod client;
pub mod mock;
pub mod query;
pub mod types;

pub use client::{DocumentClient, DocumentClientConfig};
pub use query::{DocumentQuery, SortDirection};
pub use types::{DocumentPage, DocumentSummary};

/// Document type code of an invoice
pub const INVOICE_DOCUMENT_TYPE: &str = "810";

/// Extension key holding the invoice number of a document
pub const INVOICE_NUMBER_EXTENSION: &str = "INVOICE_NUMBER";

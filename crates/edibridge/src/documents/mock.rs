use chrono::Utc;

use super::query::DocumentQuery;
use super::types::{DocumentPage, DocumentSummary};

pub const MOCK_API_VERSION: &str = "mock-v1.0.0";
pub const MOCK_NOTICE: &str =
    "This is mock data for testing. Set EDIBRIDGE_EDI__USE_MOCK_DATA=false to use the real API.";

const HOUR_MS: i64 = 3_600_000;

struct Seed {
    wfid: i64,
    source: (&'static str, &'static str),
    destination: (&'static str, &'static str),
    document_type: &'static str,
    reference: &'static str,
    status: &'static str,
    reason: &'static str,
    direction: &'static str,
    hours_ago: i64,
    inbound: Option<&'static str>,
    outbound: Option<&'static str>,
    envelope: Option<(&'static str, &'static str, &'static str)>,
    invoice: Option<&'static str>,
}

const SEEDS: [Seed; 5] = [
    Seed {
        wfid: 3285897,
        source: ("PRODUXINC", "Produx Inc"),
        destination: ("MAXXMART", "Maxx Mart"),
        document_type: "810",
        reference: "406412",
        status: "SENT",
        reason: "",
        direction: "O",
        hours_ago: 1,
        inbound: Some("ProduxInc_OB_INV_810_MaxxMart.txt"),
        outbound: Some("PRODUXINC_MAXXMART_810.txt"),
        envelope: Some(("000000003", "3", "1")),
        invoice: Some("INV-2024-0001"),
    },
    Seed {
        wfid: 3285874,
        source: ("PRODUXINC", "Produx Inc"),
        destination: ("MAXXMART", "Maxx Mart"),
        document_type: "810",
        reference: "406413",
        status: "SENT",
        reason: "",
        direction: "O",
        hours_ago: 2,
        inbound: Some("ProduxInc_OB_INV_810_MaxxMart.txt"),
        outbound: Some("PRODUXINC_MAXXMART_810.txt"),
        envelope: Some(("000000002", "2", "1")),
        invoice: Some("INV-2024-0002"),
    },
    Seed {
        wfid: 3285806,
        source: ("ACMECORP", "ACME Corporation"),
        destination: ("BIGBOX", "Big Box Store"),
        document_type: "850",
        reference: "500123",
        status: "RECEIVED",
        reason: "",
        direction: "I",
        hours_ago: 3,
        inbound: Some("ACME_PO_850_BigBox.txt"),
        outbound: None,
        envelope: Some(("000000001", "1", "1")),
        invoice: None,
    },
    Seed {
        wfid: 3285786,
        source: ("PRODUXINC", "Produx Inc"),
        destination: ("RETAILCO", "Retail Co"),
        document_type: "810",
        reference: "406414",
        status: "ERROR",
        reason: "Connection timeout",
        direction: "O",
        hours_ago: 4,
        inbound: Some("ProduxInc_OB_INV_810_RetailCo.txt"),
        outbound: None,
        envelope: None,
        invoice: Some("INV-2024-0003"),
    },
    Seed {
        wfid: 3285776,
        source: ("TECHSUPPLY", "Tech Supply Co"),
        destination: ("GROCERYHUB", "Grocery Hub"),
        document_type: "856",
        reference: "700456",
        status: "SENT",
        reason: "",
        direction: "O",
        hours_ago: 5,
        inbound: Some("TechSupply_ASN_856_GroceryHub.txt"),
        outbound: Some("TECHSUPPLY_GROCERYHUB_856.txt"),
        envelope: Some(("000000005", "5", "1")),
        invoice: None,
    },
];

impl Seed {
    fn summary(&self, now_ms: i64) -> DocumentSummary {
        let at = now_ms - self.hours_ago * HOUR_MS;
        let (interchange, group, transaction) = match self.envelope {
            Some((i, g, t)) => (Some(i.to_string()), Some(g.to_string()), Some(t.to_string())),
            None => (None, None, None),
        };

        DocumentSummary {
            wfid: self.wfid,
            source_id: Some(self.source.0.to_string()),
            source_name: Some(self.source.1.to_string()),
            destination_id: Some(self.destination.0.to_string()),
            destination_name: Some(self.destination.1.to_string()),
            document_type: Some(self.document_type.to_string()),
            reference: Some(self.reference.to_string()),
            document_status: Some("OK".to_string()),
            transaction_status: Some(self.status.to_string()),
            transaction_status_reason: Some(self.reason.to_string()),
            direction: Some(self.direction.to_string()),
            document_creation_date: Some(at),
            transaction_last_date_time: Some(at),
            inbound_message_filename: self.inbound.map(String::from),
            outbound_message_filename: self.outbound.map(String::from),
            interchange_number: interchange,
            group_number: group,
            transaction_number: transaction,
            invoice_number: self.invoice.map(String::from),
        }
    }
}

fn contains_ignore_case(haystack: &Option<String>, needle: &str) -> bool {
    haystack
        .as_deref()
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn matches(doc: &DocumentSummary, query: &DocumentQuery) -> bool {
    if let Some(destination) = non_blank(&query.destination) {
        if !contains_ignore_case(&doc.destination_id, destination) {
            return false;
        }
    }
    if let Some(source) = non_blank(&query.source) {
        if !contains_ignore_case(&doc.source_id, source) {
            return false;
        }
    }
    if let Some(document_type) = non_blank(&query.document_type) {
        if doc.document_type.as_deref() != Some(document_type) {
            return false;
        }
    }
    if let Some(status) = non_blank(&query.transaction_status) {
        if doc.transaction_status.as_deref() != Some(status) {
            return false;
        }
    }
    true
}

/// A page of seeded documents filtered by the partner, type and status fields of
/// the query. Other filters are ignored in mock mode.
pub fn mock_page(query: &DocumentQuery) -> DocumentPage {
    let now_ms = Utc::now().timestamp_millis();
    let data: Vec<DocumentSummary> = SEEDS
        .iter()
        .map(|seed| seed.summary(now_ms))
        .filter(|doc| matches(doc, query))
        .collect();

    DocumentPage {
        errors: Vec::new(),
        messages: vec![MOCK_NOTICE.to_string()],
        successful: true,
        current_page: 1,
        total_count: data.len() as u64,
        data,
        api_version: Some(MOCK_API_VERSION.to_string()),
    }
}

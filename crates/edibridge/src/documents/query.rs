use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use super::{INVOICE_DOCUMENT_TYPE, INVOICE_NUMBER_EXTENSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// A query value as it arrives from a query string or a model reply, where codes
/// like `810` may come through as numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Whole(i64),
    Real(f64),
    Flag(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Whole(n) => n.to_string(),
            Scalar::Real(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_text))
}

/// Leading digits of the value, like `parseInt`; anything else is dropped
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let count = match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Whole(n)) => u32::try_from(n).ok(),
        Some(Scalar::Real(n)) if n >= 0.0 && n <= f64::from(u32::MAX) => Some(n as u32),
        Some(Scalar::Text(text)) => {
            let text = text.trim();
            let digits = text
                .find(|c: char| !c.is_ascii_digit())
                .map_or(text, |end| &text[..end]);
            digits.parse().ok()
        }
        _ => None,
    };
    Ok(count)
}

/// Only `true` (or the string `"true"`) turns notes on
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| match value {
        Scalar::Flag(flag) => flag,
        Scalar::Text(text) => text.trim() == "true",
        _ => false,
    }))
}

fn lenient_direction<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SortDirection>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.and_then(|value| {
        match value.into_text().trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }))
}

/// Filter set for a document search. Every field is optional and absent fields are
/// never sent upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_status: Option<String>,
    /// `Y` or `N`
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub select_filtered: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub with_notes: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_by: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_direction",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_dir: Option<SortDirection>,
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub page: Option<u32>,
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_size: Option<u32>,
    /// JSON predicate over document extensions, e.g. `{"INVOICE_NUMBER":"123"}`
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub extensions: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl DocumentQuery {
    /// The filter used to look up an invoice by its number
    pub fn for_invoice(invoice_number: &str) -> Self {
        let extensions = json!({ INVOICE_NUMBER_EXTENSION: invoice_number }).to_string();
        Self {
            document_type: Some(INVOICE_DOCUMENT_TYPE.to_string()),
            select_filtered: Some("Y".to_string()),
            with_notes: Some(true),
            extensions: Some(extensions),
            sort_by: Some("transactionLastDateTime".to_string()),
            sort_dir: Some(SortDirection::Desc),
            ..Default::default()
        }
    }

    /// Fill in the defaults used for analysis and natural language searches where the
    /// caller left them out
    pub fn with_analysis_defaults(mut self) -> Self {
        if present(&self.select_filtered).is_none() {
            self.select_filtered = Some("Y".to_string());
        }
        self.with_notes.get_or_insert(true);
        if present(&self.sort_by).is_none() {
            self.sort_by = Some("transactionLastDateTime".to_string());
        }
        self.sort_dir.get_or_insert(SortDirection::Desc);
        self
    }

    /// Upstream query parameters, in upstream naming, for every present field
    pub fn to_upstream_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name, value));
            }
        };

        push("startDate", present(&self.start_date));
        push("endDate", present(&self.end_date));
        push("source", present(&self.source));
        push("destination", present(&self.destination));
        push("docType", present(&self.document_type));
        push("transactionStatus", present(&self.transaction_status));
        push("selectFiltered", present(&self.select_filtered));
        push("withNotes", self.with_notes.map(|v| v.to_string()));
        push("sortBy", present(&self.sort_by));
        push("sortDir", self.sort_dir.map(|d| d.as_str().to_string()));
        push("page", self.page.map(|v| v.to_string()));
        push("pageSize", self.page_size.map(|v| v.to_string()));
        push("extensions", present(&self.extensions));

        pairs
    }

    /// The url-encoded upstream query string, empty when no field is set
    pub fn to_query_string(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(self.to_upstream_pairs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair<'a>(pairs: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_empty_query_builds_empty_string() {
        let query = DocumentQuery::default();
        assert!(query.to_upstream_pairs().is_empty());
        assert_eq!(query.to_query_string().unwrap(), "");
    }

    #[test]
    fn test_blank_strings_are_treated_as_absent() {
        let query = DocumentQuery {
            source: Some("".to_string()),
            destination: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.to_query_string().unwrap(), "");
    }

    #[test]
    fn test_upstream_names() {
        let query = DocumentQuery {
            document_type: Some("850".to_string()),
            transaction_status: Some("ERROR".to_string()),
            with_notes: Some(false),
            sort_dir: Some(SortDirection::Asc),
            page: Some(2),
            page_size: Some(25),
            ..Default::default()
        };

        let pairs = query.to_upstream_pairs();
        assert_eq!(pairs.len(), 6);
        assert_eq!(pair(&pairs, "docType"), Some("850"));
        assert_eq!(pair(&pairs, "transactionStatus"), Some("ERROR"));
        assert_eq!(pair(&pairs, "withNotes"), Some("false"));
        assert_eq!(pair(&pairs, "sortDir"), Some("asc"));
        assert_eq!(pair(&pairs, "page"), Some("2"));
        assert_eq!(pair(&pairs, "pageSize"), Some("25"));
        assert_eq!(pair(&pairs, "documentType"), None);
    }

    #[test]
    fn test_invoice_query_fixes_type_and_selection() {
        let query = DocumentQuery::for_invoice("406412");
        let pairs = query.to_upstream_pairs();

        assert_eq!(pair(&pairs, "docType"), Some("810"));
        assert_eq!(pair(&pairs, "selectFiltered"), Some("Y"));
        assert_eq!(pair(&pairs, "withNotes"), Some("true"));
        assert_eq!(pair(&pairs, "sortBy"), Some("transactionLastDateTime"));
        assert_eq!(pair(&pairs, "sortDir"), Some("desc"));
        assert_eq!(
            pair(&pairs, "extensions"),
            Some(r#"{"INVOICE_NUMBER":"406412"}"#)
        );
    }

    #[test]
    fn test_query_string_is_encoded() {
        let query = DocumentQuery::for_invoice("A B");
        let encoded = query.to_query_string().unwrap();
        assert!(encoded.contains("docType=810"));
        assert!(encoded.contains("extensions=%7B%22INVOICE_NUMBER%22%3A%22A+B%22%7D"));
    }

    #[test]
    fn test_analysis_defaults_keep_caller_values() {
        let query = DocumentQuery {
            sort_by: Some("wfid".to_string()),
            with_notes: Some(false),
            ..Default::default()
        }
        .with_analysis_defaults();

        assert_eq!(query.select_filtered.as_deref(), Some("Y"));
        assert_eq!(query.with_notes, Some(false));
        assert_eq!(query.sort_by.as_deref(), Some("wfid"));
        assert_eq!(query.sort_dir, Some(SortDirection::Desc));
    }

    #[test]
    fn test_deserializes_camel_case() {
        let query: DocumentQuery = serde_json::from_value(json!({
            "documentType": "810",
            "pageSize": 100,
            "sortDir": "desc",
            "startDate": "2025-12-01T00:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(query.document_type.as_deref(), Some("810"));
        assert_eq!(query.page_size, Some(100));
        assert_eq!(query.sort_dir, Some(SortDirection::Desc));
        assert_eq!(query.start_date.as_deref(), Some("2025-12-01T00:00:00.000Z"));
    }

    #[test]
    fn test_numeric_codes_from_model_replies() {
        let query: DocumentQuery = serde_json::from_value(json!({
            "documentType": 810,
            "destination": "maxxmart",
            "page": "2",
            "pageSize": 25.0,
            "withNotes": "true",
            "sortDir": "DESC"
        }))
        .unwrap();

        assert_eq!(query.document_type.as_deref(), Some("810"));
        assert_eq!(query.destination.as_deref(), Some("maxxmart"));
        assert_eq!(query.page, Some(2));
        assert_eq!(query.page_size, Some(25));
        assert_eq!(query.with_notes, Some(true));
        assert_eq!(query.sort_dir, Some(SortDirection::Desc));
    }

    #[test]
    fn test_query_string_values_are_lenient() {
        let query: DocumentQuery =
            serde_urlencoded::from_str("page=abc&pageSize=50rows&withNotes=yes&sortDir=DESC&documentType=856")
                .unwrap();

        assert_eq!(query.page, None);
        assert_eq!(query.page_size, Some(50));
        assert_eq!(query.with_notes, Some(false));
        assert_eq!(query.sort_dir, Some(SortDirection::Desc));
        assert_eq!(query.document_type.as_deref(), Some("856"));

        let query: DocumentQuery = serde_urlencoded::from_str("sortDir=sideways").unwrap();
        assert_eq!(query.sort_dir, None);
        assert_eq!(query, DocumentQuery::default());
    }

    #[test]
    fn test_null_fields_are_absent() {
        let query: DocumentQuery =
            serde_json::from_value(json!({"documentType": null, "page": null})).unwrap();
        assert_eq!(query, DocumentQuery::default());
    }
}

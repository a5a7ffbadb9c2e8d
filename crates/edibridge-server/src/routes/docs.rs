use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use edibridge::documents::{DocumentPage, DocumentQuery};
use edibridge::errors::DocumentError;
use tracing::{error, info};

use crate::state::AppState;

const CHECK_LOGS: &str =
    "Check backend logs for more details. The external EDI API may not be accessible.";

fn page_response(result: Result<DocumentPage, DocumentError>) -> Response {
    match result {
        Ok(page) => {
            info!(count = page.data.len(), "returning documents");
            Json(page).into_response()
        }
        Err(e) if e.is_validation() => (
            StatusCode::BAD_REQUEST,
            Json(DocumentPage::failure(vec![e.to_string()], vec![])),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "document request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DocumentPage::failure(
                    vec![e.to_string()],
                    vec![CHECK_LOGS.to_string()],
                )),
            )
                .into_response()
        }
    }
}

async fn list_documents(
    State(state): State<AppState>,
    query: Result<Query<DocumentQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(DocumentPage::failure(vec![rejection.body_text()], vec![])),
            )
                .into_response()
        }
    };
    info!(?query, "document search");
    page_response(state.documents.fetch(&query).await)
}

async fn invoice_by_number(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> Response {
    info!(%invoice_number, "invoice lookup");
    page_response(state.documents.find_invoice(&invoice_number).await)
}

async fn missing_invoice_number() -> Response {
    page_response(Err(DocumentError::MissingInvoiceNumber))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/docs", get(list_documents))
        .route("/api/docs/invoice", get(missing_invoice_number))
        .route("/api/docs/invoice/", get(missing_invoice_number))
        .route("/api/docs/invoice/:invoice_number", get(invoice_by_number))
        .with_state(state)
}

// Export route modules
pub mod ai;
pub mod assistant;
pub mod docs;
pub mod health;
pub mod sse;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes(state.clone()))
        .merge(docs::routes(state.clone()))
        .merge(ai::routes(state.clone()))
        .merge(assistant::routes(state))
}

/// Browser access for the configured origins only. Origins that are not valid
/// header values are skipped. A `*` entry admits any origin by echoing it back,
/// since a literal wildcard cannot be combined with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin.trim() == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origin_values(origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn origin_values(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect()
}

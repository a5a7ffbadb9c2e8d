use axum::{extract::State, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::state::AppState;

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "environment": state.environment,
    }))
}

async fn banner() -> Json<Value> {
    Json(json!({
        "message": "EDI Bridge API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "ai": "/api/ai",
            "assistant": "/api/assistant",
            "docs": "/api/docs",
        }
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Settings;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let app = routes(AppState::with_provider(&Settings::default(), None));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["environment"], "development");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_banner_lists_endpoints() {
        let (status, body) = get_json("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["docs"], "/api/docs");
        assert_eq!(body["endpoints"]["assistant"], "/api/assistant");
    }
}

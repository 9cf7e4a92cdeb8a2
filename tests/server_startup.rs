//! Server Startup Tests
//!
//! Tests for server lifecycle, configuration loading, and startup behavior.

use axum::{Router, body::Body, http::Request};
use serde_json::Value;
use tower::util::ServiceExt;

use scribe_gateway::{ServerConfig, state::AppState};

fn create_minimal_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        deepgram_api_key: "test_key".to_string(),
        language: "en".to_string(),
        model: "nova-2".to_string(),
        cors_allowed_origins: None,
    }
}

/// The health check endpoint responds with the expected shape
#[tokio::test]
async fn test_health_check_endpoint() {
    let app_state = AppState::new(create_minimal_config());

    let app = Router::new()
        .route(
            "/",
            axum::routing::get(scribe_gateway::handlers::api::health_check),
        )
        .with_state(app_state);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "OK");
}

/// The WebSocket route rejects plain HTTP requests without an upgrade
#[tokio::test]
async fn test_stream_route_requires_upgrade() {
    let app_state = AppState::new(create_minimal_config());
    let app = scribe_gateway::routes::ws::create_ws_router().with_state(app_state);

    let request = Request::builder()
        .uri("/stream")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(!response.status().is_success());
}

/// Address formatting follows host:port
#[test]
fn test_config_address() {
    let config = create_minimal_config();
    assert_eq!(config.address(), "127.0.0.1:0");
}

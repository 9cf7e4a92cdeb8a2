//! Health check endpoint.

use axum::Json;
use serde_json::{Value, json};

/// Health check handler
///
/// Returns a simple status payload so load balancers and tests can verify
/// the process is up.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "scribe-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

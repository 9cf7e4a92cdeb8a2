//! Streaming transcription WebSocket route configuration.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::stream::stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the streaming WebSocket router
///
/// # Endpoint
///
/// `GET /stream` - WebSocket upgrade for real-time transcription
///
/// # Protocol
///
/// After the upgrade, clients send:
/// 1. `{"type": "configure-stream", "sampleRate": 16000}`
/// 2. Binary audio frames (PCM 16-bit, mono)
/// 3. `{"type": "stop-stream"}` when done
///
/// Server responds with:
/// - `{"type": "transcriber-ready"}` once the provider accepts audio
/// - `{"type": "partial", "text": "..."}` for interim transcripts
/// - `{"type": "final", "text": "..."}` for settled transcripts
/// - `{"type": "error", "message": "..."}` on failures
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stream", get(stream_handler))
        .layer(TraceLayer::new_for_http())
}

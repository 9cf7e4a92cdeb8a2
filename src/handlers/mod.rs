//! HTTP and WebSocket request handlers
//!
//! This module organizes all handlers into logical groups:
//! - `api` - Health check endpoint
//! - `stream` - Streaming transcription WebSocket

pub mod api;
pub mod stream;

// Re-export commonly used handlers for convenient access
pub use stream::stream_handler;

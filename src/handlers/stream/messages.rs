//! Wire messages for the streaming transcription WebSocket.
//!
//! Client to server: `configure-stream` and `stop-stream` as JSON text
//! frames, plus raw binary PCM16 audio frames. Server to client:
//! `transcriber-ready`, `partial`, `final` and `error` as JSON text frames.

use serde::{Deserialize, Serialize};

/// Incoming WebSocket messages from the client.
///
/// `sampleRate` is kept as a raw JSON value so that malformed shapes
/// (missing, non-numeric, empty string) reach the session for validation
/// instead of failing at the transport parse layer; the session answers
/// them with a client-visible `error`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Request a transcription stream at the given sample rate.
    #[serde(rename = "configure-stream")]
    ConfigureStream {
        #[serde(rename = "sampleRate", default)]
        sample_rate: Option<serde_json::Value>,
    },

    /// Stop the transcription stream; the session returns to idle.
    #[serde(rename = "stop-stream")]
    StopStream,
}

/// Outgoing WebSocket messages to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// The transcription provider accepts audio from now on.
    #[serde(rename = "transcriber-ready")]
    TranscriberReady,

    /// Incremental transcript; replaces the previous partial entirely.
    #[serde(rename = "partial")]
    Partial { text: String },

    /// Settled transcript for a recognized utterance.
    #[serde(rename = "final")]
    Final { text: String },

    /// Human-readable error; never raw internal exception data.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Message routing between the session loop and the socket sender task.
#[derive(Debug)]
pub enum MessageRoute {
    /// JSON text message to the client.
    Outgoing(OutgoingMessage),
    /// Close the connection.
    Close,
}

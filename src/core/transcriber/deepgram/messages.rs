//! WebSocket message types for the Deepgram live transcription API.
//!
//! Incoming messages (server to client):
//! - [`ResultsMessage`]: transcript alternatives with `is_final`/`speech_final`
//! - [`MetadataMessage`]: request metadata sent at stream start and end
//! - `UtteranceEnd` / `SpeechStarted`: speech boundary notifications
//! - [`DeepgramErrorMessage`]: error responses
//!
//! Outgoing control messages (client to server):
//! - [`CloseStreamMessage`]: graceful termination request
//! - Binary audio frames are sent directly, no JSON wrapper.

use serde::{Deserialize, Serialize};

use super::super::TranscriberError;

/// One transcription hypothesis for an audio segment.
#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    /// Transcript text; empty when the segment contained no speech.
    pub transcript: String,
    /// Confidence score for this alternative (0.0 to 1.0).
    #[serde(default)]
    pub confidence: f64,
}

/// Per-channel transcription results.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    /// Hypotheses ordered by confidence; the first is the best one.
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Transcription results for a segment of audio.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    /// Segment start offset in seconds.
    #[serde(default)]
    pub start: f64,
    /// Segment duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Whether this transcript is settled; interim results replace each other
    /// until a final one arrives.
    #[serde(default)]
    pub is_final: bool,
    /// Whether Deepgram detected the end of speech for this utterance.
    #[serde(default)]
    pub speech_final: bool,
    /// Channel results; mono audio yields exactly one channel.
    pub channel: Channel,
}

impl ResultsMessage {
    /// Best transcript text, or `None` when the segment was silent.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|text| !text.is_empty())
    }
}

/// Stream metadata, sent when the connection opens and again on close.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataMessage {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub channels: u16,
}

/// Error response from Deepgram.
#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramErrorMessage {
    /// Short error description.
    #[serde(default)]
    pub description: String,
    /// Detailed error message.
    #[serde(default)]
    pub message: String,
    /// Error variant identifier.
    #[serde(default)]
    pub variant: Option<String>,
}

impl DeepgramErrorMessage {
    /// Human-readable message preferring the detailed field.
    pub fn display_message(&self) -> &str {
        if !self.message.is_empty() {
            &self.message
        } else {
            &self.description
        }
    }
}

/// Parsed incoming Deepgram message.
#[derive(Debug, Clone)]
pub enum DeepgramMessage {
    Results(ResultsMessage),
    Metadata(MetadataMessage),
    UtteranceEnd,
    SpeechStarted,
    Error(DeepgramErrorMessage),
    /// Message types this client does not act on.
    Unknown(String),
}

impl DeepgramMessage {
    /// Parse a raw JSON text frame into a typed message.
    ///
    /// Messages carry a `type` discriminator field. Unknown types are kept
    /// (for debug logging) rather than rejected; structurally invalid
    /// payloads surface as [`TranscriberError::ProtocolError`].
    pub fn parse(text: &str) -> Result<Self, TranscriberError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| TranscriberError::ProtocolError(format!("invalid JSON: {e}")))?;

        let message_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                TranscriberError::ProtocolError("message missing 'type' field".to_string())
            })?
            .to_string();

        match message_type.as_str() {
            "Results" => {
                let results: ResultsMessage = serde_json::from_value(value).map_err(|e| {
                    TranscriberError::ProtocolError(format!("malformed Results message: {e}"))
                })?;
                Ok(Self::Results(results))
            }
            "Metadata" => {
                let metadata: MetadataMessage = serde_json::from_value(value).map_err(|e| {
                    TranscriberError::ProtocolError(format!("malformed Metadata message: {e}"))
                })?;
                Ok(Self::Metadata(metadata))
            }
            "UtteranceEnd" => Ok(Self::UtteranceEnd),
            "SpeechStarted" => Ok(Self::SpeechStarted),
            "Error" => {
                let error: DeepgramErrorMessage =
                    serde_json::from_value(value).map_err(|e| {
                        TranscriberError::ProtocolError(format!("malformed Error message: {e}"))
                    })?;
                Ok(Self::Error(error))
            }
            _ => Ok(Self::Unknown(message_type)),
        }
    }
}

/// Request to gracefully terminate a live transcription stream.
///
/// Deepgram flushes any buffered audio and sends final results plus a
/// closing Metadata message before closing the socket.
#[derive(Debug, Clone, Serialize)]
pub struct CloseStreamMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for CloseStreamMessage {
    fn default() -> Self {
        Self {
            message_type: "CloseStream",
        }
    }
}

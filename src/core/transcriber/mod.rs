//! Streaming transcription provider abstraction.
//!
//! A [`Transcriber`] owns exactly one live connection to an external
//! speech-to-text backend and translates its event vocabulary into the
//! session's [`TranscriberEvent`] variants, delivered through a single
//! per-session channel. This deliberately avoids open-ended event
//! subscription: the four event kinds are the whole contract.

pub mod deepgram;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use deepgram::{DeepgramConfig, DeepgramTranscriber};

/// Minimum supported sample rate (8kHz for telephony)
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Maximum supported sample rate (48kHz for high-quality audio)
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// Event emitted by a transcriber toward its owning session.
///
/// Exactly one `Ready` is emitted per successful connection, followed by
/// zero or more `Partial`/`Final` events (mutually exclusive per transcript
/// increment) and zero or more `Error` events. Ordering of delivery matches
/// the order received from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriberEvent {
    /// Provider connection established and accepting audio.
    Ready,
    /// Incremental transcript; fully replaced by the next partial or final.
    Partial(String),
    /// Settled transcript for a recognized utterance.
    Final(String),
    /// Human-readable provider failure; does not imply teardown.
    Error(String),
}

/// Errors produced by transcriber handles.
#[derive(Debug, Clone, Error)]
pub enum TranscriberError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("provider protocol error: {0}")]
    ProtocolError(String),
}

/// Provider-agnostic transcription configuration.
///
/// The sample rate is negotiated per session; everything else comes from
/// server configuration and carries the fixed stream parameters
/// (PCM16 mono, punctuated, interim results enabled).
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Provider API key.
    pub api_key: String,
    /// Recognition language (e.g. "en").
    pub language: String,
    /// Negotiated sample rate in Hz.
    pub sample_rate: u32,
    /// Audio channel count; the capture layer sends mono.
    pub channels: u16,
    /// Enable punctuation in transcripts.
    pub punctuate: bool,
    /// Audio encoding; the capture layer sends linear PCM16.
    pub encoding: String,
    /// Provider model name.
    pub model: String,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: "en".to_string(),
            sample_rate: 16000,
            channels: 1,
            punctuate: true,
            encoding: "linear16".to_string(),
            model: "nova-2".to_string(),
        }
    }
}

/// One live connection to an external speech-to-text backend.
///
/// Handles are held inside session futures that move across runtime
/// threads, so implementors must be `Send + Sync`.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Establish the provider connection.
    ///
    /// Asynchronous in the protocol sense: a successful return means the
    /// connection task was started, not that the provider accepts audio.
    /// Readiness is signaled by a later [`TranscriberEvent::Ready`] on the
    /// event channel; callers must not stream audio assuming readiness.
    async fn connect(&mut self) -> Result<(), TranscriberError>;

    /// Forward one audio frame to the provider.
    ///
    /// Frames sent before the provider is ready are buffered in a bounded
    /// queue; overflow is dropped with a warning rather than risking the
    /// provider closing the connection on early audio.
    async fn send_audio(&mut self, frame: Bytes) -> Result<(), TranscriberError>;

    /// Gracefully terminate the provider connection.
    ///
    /// Idempotent: safe to call when never connected or already finished.
    async fn finish(&mut self) -> Result<(), TranscriberError>;

    /// Whether the provider has signaled readiness and audio flows directly.
    fn is_ready(&self) -> bool;

    /// Short human-readable provider identifier for logs.
    fn provider_info(&self) -> &'static str;
}

/// Factory for transcriber handles.
///
/// Injected through [`crate::state::AppState`] so tests can substitute an
/// instrumented mock without touching the session code path.
pub type TranscriberFactory = Arc<
    dyn Fn(
            TranscriberConfig,
            mpsc::Sender<TranscriberEvent>,
        ) -> Result<Box<dyn Transcriber>, TranscriberError>
        + Send
        + Sync,
>;

/// Factory producing [`DeepgramTranscriber`] handles.
pub fn deepgram_factory() -> TranscriberFactory {
    Arc::new(|config, events_tx| {
        let transcriber = DeepgramTranscriber::new(config, events_tx)?;
        Ok(Box::new(transcriber) as Box<dyn Transcriber>)
    })
}

//! Deepgram STT WebSocket client implementation.
//!
//! Owns one live connection to the Deepgram live transcription API and
//! implements the [`Transcriber`] trait for it. Audio flows through a
//! bounded channel into a background connection task; transcript events
//! flow back through the session's event channel.
//!
//! Deepgram must be ready before audio reaches the socket or it may close
//! the connection, so the bounded audio channel doubles as the pre-ready
//! buffer: frames queued before the handshake completes are flushed by the
//! connection task once it starts draining, and overflow beyond the queue
//! capacity is dropped with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::{DEEPGRAM_HOST, DeepgramConfig};
use super::messages::{CloseStreamMessage, DeepgramMessage};
use crate::core::transcriber::{
    MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, Transcriber, TranscriberConfig, TranscriberError,
    TranscriberEvent,
};

/// Maximum audio chunk size in bytes (sanity check).
///
/// At 48kHz mono 16-bit PCM one second of audio is ~96KB, so 256KB allows
/// ~2.5 seconds per frame, far beyond what the capture layer produces.
const MAX_AUDIO_CHUNK_SIZE: usize = 256 * 1024;

/// Pre-ready audio queue capacity in frames.
///
/// Frames accepted before Deepgram signals readiness wait here; beyond this
/// cap they are dropped (lost audio at utterance start is preferred over
/// unbounded growth against a slow provider).
const AUDIO_QUEUE_FRAMES: usize = 32;

/// Per-message idle timeout for WebSocket reception. Resets after each
/// successful message; catches stuck or dead provider connections.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period for the connection task to wind down on finish().
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Deepgram STT WebSocket client.
///
/// The connection task is spawned by [`Transcriber::connect`] and owns the
/// socket; this handle only holds the channel endpoints. Readiness is
/// signaled to the session with [`TranscriberEvent::Ready`] once the
/// handshake completes, never by `connect`'s return.
pub struct DeepgramTranscriber {
    config: DeepgramConfig,
    events_tx: mpsc::Sender<TranscriberEvent>,
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl DeepgramTranscriber {
    /// Create an unconnected handle.
    pub fn new(
        config: TranscriberConfig,
        events_tx: mpsc::Sender<TranscriberEvent>,
    ) -> Result<Self, TranscriberError> {
        if config.api_key.is_empty() {
            return Err(TranscriberError::AuthenticationFailed(
                "API key is required for Deepgram STT".to_string(),
            ));
        }

        let sample_rate = config.sample_rate;
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(TranscriberError::ConfigurationError(format!(
                "Sample rate {} Hz is outside supported range ({}-{} Hz)",
                sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }

        Ok(Self {
            config: DeepgramConfig::from_base(config),
            events_tx,
            audio_tx: None,
            shutdown_tx: None,
            connection_handle: None,
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle one incoming WebSocket message from Deepgram.
    ///
    /// Returns `Ok(true)` to continue the connection, `Ok(false)` when the
    /// provider closed the stream, `Err` on a fault that should surface to
    /// the session.
    async fn handle_provider_message(
        message: Message,
        events_tx: &mpsc::Sender<TranscriberEvent>,
    ) -> Result<bool, TranscriberError> {
        match message {
            Message::Text(text) => {
                debug!("Received Deepgram message: {}", text);

                match DeepgramMessage::parse(&text) {
                    Ok(DeepgramMessage::Results(results)) => {
                        if let Some(transcript) = results.transcript() {
                            let event = if results.is_final {
                                TranscriberEvent::Final(transcript.to_string())
                            } else {
                                TranscriberEvent::Partial(transcript.to_string())
                            };
                            // Awaited send keeps events in provider order.
                            if events_tx.send(event).await.is_err() {
                                debug!("Session event channel closed, stopping relay");
                                return Ok(false);
                            }
                        }
                    }
                    Ok(DeepgramMessage::Metadata(meta)) => {
                        debug!(
                            "Deepgram stream metadata: request_id={} duration={}s",
                            meta.request_id, meta.duration
                        );
                    }
                    Ok(DeepgramMessage::UtteranceEnd) => {
                        debug!("Deepgram utterance end");
                    }
                    Ok(DeepgramMessage::SpeechStarted) => {
                        debug!("Deepgram speech started");
                    }
                    Ok(DeepgramMessage::Error(err)) => {
                        return Err(TranscriberError::ProviderError(
                            err.display_message().to_string(),
                        ));
                    }
                    Ok(DeepgramMessage::Unknown(kind)) => {
                        debug!("Ignoring unknown Deepgram message type: {}", kind);
                    }
                    Err(e) => {
                        // Malformed payload. Surface it but keep the stream alive.
                        warn!("Failed to parse Deepgram message: {}", e);
                        let _ = events_tx.send(TranscriberEvent::Error(e.to_string())).await;
                    }
                }
            }
            Message::Close(close_frame) => {
                info!("Deepgram WebSocket closed: {:?}", close_frame);
                return Ok(false);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                debug!("Unexpected binary message from Deepgram");
            }
            _ => {}
        }

        Ok(true)
    }

    /// Spawn the WebSocket connection task.
    fn start_connection(&mut self) -> Result<(), TranscriberError> {
        let ws_url = self.config.build_websocket_url();
        let api_key = self.config.base.api_key.clone();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_QUEUE_FRAMES);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        self.audio_tx = Some(audio_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let events_tx = self.events_tx.clone();
        let is_connected = self.is_connected.clone();

        let connection_handle = tokio::spawn(async move {
            let request = match tokio_tungstenite::tungstenite::http::Request::builder()
                .method("GET")
                .uri(&ws_url)
                .header("Host", DEEPGRAM_HOST)
                .header("Upgrade", "websocket")
                .header("Connection", "upgrade")
                .header("Sec-WebSocket-Key", generate_key())
                .header("Sec-WebSocket-Version", "13")
                .header("Authorization", format!("Token {api_key}"))
                .body(())
            {
                Ok(request) => request,
                Err(e) => {
                    let msg = format!("Failed to create WebSocket request: {e}");
                    error!("{}", msg);
                    let _ = events_tx.send(TranscriberEvent::Error(msg)).await;
                    return;
                }
            };

            let (ws_stream, _response) = match connect_async(request).await {
                Ok(result) => result,
                Err(e) => {
                    let msg = format!("Failed to connect to Deepgram: {e}");
                    error!("{}", msg);
                    let _ = events_tx.send(TranscriberEvent::Error(msg)).await;
                    return;
                }
            };

            info!("Connected to Deepgram STT WebSocket");
            is_connected.store(true, Ordering::Release);

            // Connection is live; audio queued during the handshake drains
            // from here on in arrival order.
            if events_tx.send(TranscriberEvent::Ready).await.is_err() {
                debug!("Session gone before Deepgram became ready");
                return;
            }

            let (mut ws_sink, mut ws_stream) = ws_stream.split();

            loop {
                tokio::select! {
                    Some(audio_data) = audio_rx.recv() => {
                        let data_len = audio_data.len();
                        if let Err(e) = ws_sink.send(Message::Binary(audio_data)).await {
                            let msg = format!("Failed to send audio to Deepgram: {e}");
                            error!("{}", msg);
                            let _ = events_tx.send(TranscriberEvent::Error(msg)).await;
                            is_connected.store(false, Ordering::Release);
                            break;
                        }
                        debug!("Sent {} bytes of audio to Deepgram", data_len);
                    }

                    message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                        match message {
                            Ok(Some(Ok(msg))) => {
                                match Self::handle_provider_message(msg, &events_tx).await {
                                    Ok(true) => {}
                                    Ok(false) => {
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                    Err(e) => {
                                        error!("Deepgram streaming error: {}", e);
                                        let _ = events_tx
                                            .send(TranscriberEvent::Error(e.to_string()))
                                            .await;
                                        is_connected.store(false, Ordering::Release);
                                        break;
                                    }
                                }
                            }
                            Ok(Some(Err(e))) => {
                                let msg = format!("WebSocket error: {e}");
                                error!("{}", msg);
                                let _ = events_tx.send(TranscriberEvent::Error(msg)).await;
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Ok(None) => {
                                info!("Deepgram WebSocket stream ended");
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                            Err(_elapsed) => {
                                let msg =
                                    "WebSocket idle timeout - no message for 60 seconds".to_string();
                                error!("Deepgram STT idle timeout");
                                let _ = events_tx.send(TranscriberEvent::Error(msg)).await;
                                is_connected.store(false, Ordering::Release);
                                break;
                            }
                        }
                    }

                    _ = &mut shutdown_rx => {
                        info!("Received shutdown signal for Deepgram STT");

                        if let Ok(json) = serde_json::to_string(&CloseStreamMessage::default()) {
                            let _ = ws_sink.send(Message::Text(json.into())).await;
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        is_connected.store(false, Ordering::Release);
                        break;
                    }
                }
            }

            info!("Deepgram STT WebSocket connection closed");
        });

        self.connection_handle = Some(connection_handle);
        Ok(())
    }
}

impl Drop for DeepgramTranscriber {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn connect(&mut self) -> Result<(), TranscriberError> {
        if self.connection_handle.is_some() {
            return Err(TranscriberError::ConnectionFailed(
                "Deepgram connection already started".to_string(),
            ));
        }
        self.start_connection()
    }

    async fn send_audio(&mut self, frame: Bytes) -> Result<(), TranscriberError> {
        let data_len = frame.len();
        if data_len > MAX_AUDIO_CHUNK_SIZE {
            return Err(TranscriberError::ConfigurationError(format!(
                "Audio chunk size {} bytes exceeds maximum {} bytes",
                data_len, MAX_AUDIO_CHUNK_SIZE
            )));
        }

        let Some(audio_tx) = &self.audio_tx else {
            return Err(TranscriberError::ConnectionFailed(
                "Not connected to Deepgram STT".to_string(),
            ));
        };

        if self.is_ready() {
            audio_tx
                .send(frame)
                .await
                .map_err(|e| TranscriberError::NetworkError(format!("Failed to queue audio: {e}")))?;
        } else {
            // Pre-ready: bounded buffering with drop beyond the cap.
            match audio_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Pre-ready audio queue full ({} frames), dropping {} byte frame",
                        AUDIO_QUEUE_FRAMES, data_len
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    return Err(TranscriberError::ConnectionFailed(
                        "Deepgram connection task ended".to_string(),
                    ));
                }
            }
        }

        debug!("Queued {} bytes of audio for Deepgram", data_len);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TranscriberError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(SHUTDOWN_TIMEOUT, handle).await;
        }

        self.audio_tx = None;
        self.is_connected.store(false, Ordering::Release);

        info!("Disconnected from Deepgram STT");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.audio_tx.is_some()
    }

    fn provider_info(&self) -> &'static str {
        "Deepgram Streaming STT"
    }
}

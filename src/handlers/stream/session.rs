//! Per-connection streaming session state machine.
//!
//! A [`Session`] coordinates one transcription lifecycle: it owns at most
//! one live transcriber handle, validates configuration, gates audio flow,
//! and fans provider events back to the originating client only.
//!
//! All transitions are applied from the single per-connection event loop in
//! `handler.rs`, so client-originated messages and provider-originated
//! events interleave into one ordering and only one transition runs at a
//! time. A `Ready` racing a `stop` therefore lands strictly before or after
//! it, never during.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::transcriber::{
    Transcriber, TranscriberConfig, TranscriberEvent, TranscriberFactory,
};

use super::messages::{MessageRoute, OutgoingMessage};

/// Buffer for one provider's event stream before it is tagged and merged
/// into the session channel.
const PROVIDER_EVENT_BUFFER: usize = 64;

/// A transcriber event tagged with the generation of the provider that
/// produced it. Stale generations are discarded by
/// [`Session::transcriber_event`].
pub type TaggedEvent = (u64, TranscriberEvent);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No provider; awaiting a valid `configure-stream`.
    Idle,
    /// Provider creation in flight; readiness not yet signaled.
    Configuring,
    /// Provider ready; audio flows.
    Streaming,
    /// Terminal; the connection is gone.
    Closed,
}

/// Per-connection session owning one transcriber lifecycle.
pub struct Session {
    id: Uuid,
    state: SessionState,
    sample_rate: Option<u32>,
    transcriber: Option<Box<dyn Transcriber>>,
    /// Bumped on every provider creation; events carrying an older
    /// generation belong to a torn-down handle and are discarded.
    generation: u64,
    factory: TranscriberFactory,
    transcriber_config: TranscriberConfig,
    events_tx: mpsc::Sender<TaggedEvent>,
    message_tx: mpsc::Sender<MessageRoute>,
}

impl Session {
    pub fn new(
        factory: TranscriberFactory,
        transcriber_config: TranscriberConfig,
        events_tx: mpsc::Sender<TaggedEvent>,
        message_tx: mpsc::Sender<MessageRoute>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            sample_rate: None,
            transcriber: None,
            generation: 0,
            factory,
            transcriber_config,
            events_tx,
            message_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle `configure-stream`.
    ///
    /// Exactly one provider is created per configured session: a second
    /// configure while a provider exists or is being created is a no-op,
    /// tolerating duplicate client-side clicks. An invalid sample rate
    /// produces a client-visible `error` and leaves the session in `Idle`
    /// so re-configuration stays possible.
    pub async fn configure(&mut self, raw_sample_rate: Option<serde_json::Value>) {
        if self.state == SessionState::Closed {
            return;
        }

        if self.transcriber.is_some() {
            debug!(session_id = %self.id, "Duplicate configure-stream ignored, provider already exists");
            return;
        }

        let Some(sample_rate) = parse_sample_rate(raw_sample_rate.as_ref()) else {
            warn!(session_id = %self.id, ?raw_sample_rate, "Rejected configure-stream with invalid sampleRate");
            self.emit(OutgoingMessage::Error {
                message: "invalid configuration: sampleRate must be a positive number".to_string(),
            })
            .await;
            return;
        };

        let mut config = self.transcriber_config.clone();
        config.sample_rate = sample_rate;

        // Each provider writes to its own channel; a forwarder tags its
        // events with the generation so a handle torn down by stop cannot
        // speak for its successor after a re-configure.
        self.generation += 1;
        let generation = self.generation;
        let (provider_tx, mut provider_rx) =
            mpsc::channel::<TranscriberEvent>(PROVIDER_EVENT_BUFFER);

        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = provider_rx.recv().await {
                if events_tx.send((generation, event)).await.is_err() {
                    break;
                }
            }
        });

        let mut transcriber = match (self.factory)(config, provider_tx) {
            Ok(transcriber) => transcriber,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to create transcriber");
                self.emit(OutgoingMessage::Error {
                    message: format!("failed to start transcription: {e}"),
                })
                .await;
                return;
            }
        };

        // Non-blocking: readiness arrives later as a TranscriberEvent::Ready
        // on the session's event channel.
        if let Err(e) = transcriber.connect().await {
            warn!(session_id = %self.id, error = %e, "Transcriber connect failed");
            self.emit(OutgoingMessage::Error {
                message: format!("failed to start transcription: {e}"),
            })
            .await;
            return;
        }

        info!(
            session_id = %self.id,
            sample_rate,
            provider = transcriber.provider_info(),
            "Transcription stream configured"
        );

        self.sample_rate = Some(sample_rate);
        self.transcriber = Some(transcriber);
        self.state = SessionState::Configuring;
    }

    /// Forward one audio frame to the transcriber handle.
    ///
    /// Silently dropped when no provider exists; the handle itself gates
    /// pre-ready frames through its bounded queue.
    pub async fn audio(&mut self, frame: Bytes) {
        let result = match self.transcriber.as_mut() {
            Some(transcriber) => transcriber.send_audio(frame).await,
            None => {
                debug!(session_id = %self.id, "Dropping audio frame, no transcriber configured");
                return;
            }
        };

        if let Err(e) = result {
            warn!(session_id = %self.id, error = %e, "Failed to forward audio frame");
            self.emit(OutgoingMessage::Error {
                message: format!("failed to forward audio: {e}"),
            })
            .await;
        }
    }

    /// Handle `stop-stream`: tear down the provider and return to `Idle`.
    ///
    /// A stop with no provider is a logged no-op, never an error.
    pub async fn stop(&mut self) {
        match self.transcriber.take() {
            Some(mut transcriber) => {
                if let Err(e) = transcriber.finish().await {
                    warn!(session_id = %self.id, error = %e, "Error closing transcriber on stop");
                }
                self.sample_rate = None;
                self.state = SessionState::Idle;
                info!(session_id = %self.id, "Transcription stream stopped");
            }
            None => {
                debug!(session_id = %self.id, "stop-stream with no active transcriber");
            }
        }
    }

    /// Apply one provider-originated event.
    ///
    /// Events can trail behind an explicit stop, and a queued event from a
    /// previous provider can arrive after a re-configure. Both carry either
    /// no live handle or a stale generation and are dropped with a log, so
    /// only the current provider can drive the state machine.
    pub async fn transcriber_event(&mut self, generation: u64, event: TranscriberEvent) {
        if generation != self.generation || self.transcriber.is_none() {
            debug!(session_id = %self.id, generation, ?event, "Ignoring transcriber event from torn-down provider");
            return;
        }

        match event {
            TranscriberEvent::Ready => {
                if self.state == SessionState::Configuring {
                    self.state = SessionState::Streaming;
                    info!(session_id = %self.id, "Transcriber ready");
                    self.emit(OutgoingMessage::TranscriberReady).await;
                } else {
                    debug!(session_id = %self.id, state = ?self.state, "Ignoring Ready in unexpected state");
                }
            }
            TranscriberEvent::Partial(text) => {
                self.emit(OutgoingMessage::Partial { text }).await;
            }
            TranscriberEvent::Final(text) => {
                self.emit(OutgoingMessage::Final { text }).await;
            }
            TranscriberEvent::Error(message) => {
                // Provider errors are relayed but do not transition state:
                // some are transient, and teardown stays an explicit
                // stop/disconnect decision.
                warn!(session_id = %self.id, error = %message, "Transcriber error");
                self.emit(OutgoingMessage::Error { message }).await;
            }
        }
    }

    /// Handle disconnect: release any live provider connection promptly and
    /// move to the terminal state.
    pub async fn shutdown(&mut self) {
        if let Some(mut transcriber) = self.transcriber.take() {
            if let Err(e) = transcriber.finish().await {
                warn!(session_id = %self.id, error = %e, "Error closing transcriber on disconnect");
            }
        }
        self.state = SessionState::Closed;
        info!(session_id = %self.id, "Session closed");
    }

    async fn emit(&self, message: OutgoingMessage) {
        if self.message_tx.send(MessageRoute::Outgoing(message)).await.is_err() {
            debug!(session_id = %self.id, "Client message channel closed");
        }
    }
}

/// Validate the `sampleRate` field of `configure-stream`.
///
/// Accepts positive integral JSON numbers (including integral floats, since
/// browser clients serialize numbers loosely); anything else is rejected.
fn parse_sample_rate(raw: Option<&serde_json::Value>) -> Option<u32> {
    let value = raw?;

    let rate = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f > 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })?;

    if rate == 0 || rate > u64::from(u32::MAX) {
        return None;
    }

    Some(rate as u32)
}

//! Streaming transcription WebSocket handler.
//!
//! Upgrades the HTTP connection and runs the per-connection event loop:
//! client messages and transcriber events are interleaved into a single
//! ordering and applied to the session one at a time.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::messages::{IncomingMessage, MessageRoute, OutgoingMessage};
use super::session::{Session, TaggedEvent};

/// Channel buffer size for outgoing messages and transcriber events.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB); audio frames are far smaller.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB).
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How often the connection is checked for staleness.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum idle time before closing the connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Streaming transcription WebSocket handler.
///
/// # Endpoint
///
/// `GET /stream` - WebSocket upgrade for microphone audio relay
pub async fn stream_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_stream_socket(socket, state))
}

/// Run one streaming session over an upgraded socket.
async fn handle_stream_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let (events_tx, mut events_rx) = mpsc::channel::<TaggedEvent>(CHANNEL_BUFFER_SIZE);

    // Sender task: the only writer on the socket, preserving generation
    // order of outgoing messages.
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let mut session = Session::new(
        app_state.transcriber_factory.clone(),
        app_state.transcriber_config(),
        events_tx,
        message_tx.clone(),
    );

    info!(session_id = %session.id(), "Streaming connection established");

    let mut last_activity = std::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = std::time::Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_client_message(msg, &mut session, &message_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // Channel-level failure is a disconnect.
                        warn!(session_id = %session.id(), "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session.id(), "Connection closed by client");
                        break;
                    }
                }
            }

            Some((generation, event)) = events_rx.recv() => {
                session.transcriber_event(generation, event).await;
            }

            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    warn!(
                        session_id = %session.id(),
                        "Connection idle for {}s, closing",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = message_tx.send(MessageRoute::Close).await;
                    break;
                }
            }
        }
    }

    // Disconnect: release the provider connection promptly so no live
    // provider session outlives its client.
    session.shutdown().await;
    sender_task.abort();

    info!(session_id = %session.id(), "Streaming connection terminated");
}

/// Apply one client-originated WebSocket message to the session.
///
/// Returns `false` to terminate the connection.
async fn process_client_message(
    msg: Message,
    session: &mut Session,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            let incoming: IncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(session_id = %session.id(), "Unparseable client message: {}", e);
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                            message: format!("invalid message: {e}"),
                        }))
                        .await;
                    return true;
                }
            };

            match incoming {
                IncomingMessage::ConfigureStream { sample_rate } => {
                    session.configure(sample_rate).await;
                }
                IncomingMessage::StopStream => {
                    session.stop().await;
                }
            }
            true
        }
        Message::Binary(data) => {
            debug!(session_id = %session.id(), "Received {} byte audio frame", data.len());
            session.audio(data).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(session_id = %session.id(), "Close frame received");
            false
        }
    }
}

//! Streaming session integration tests
//!
//! Drives the `/stream` WebSocket endpoint end to end with a mock
//! transcription backend. The mock echoes each audio frame back as a
//! partial and a final transcript, so tests can verify routing, session
//! lifecycle, and that events land on the connection that produced them.
//!
//! Run: cargo test --test stream_session

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use scribe_gateway::core::transcriber::{
    Transcriber, TranscriberConfig, TranscriberError, TranscriberEvent, TranscriberFactory,
};
use scribe_gateway::{ServerConfig, routes, state::AppState};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Counters shared between a test and the mock backend it injected
#[derive(Default)]
struct MockStats {
    /// Number of provider sessions opened
    opens: AtomicUsize,
    /// Number of provider sessions gracefully finished
    finishes: AtomicUsize,
    /// Total audio frames received across all sessions
    frames: AtomicUsize,
    /// Last sample rate a session was opened with
    last_sample_rate: AtomicUsize,
}

/// In-process transcription backend.
///
/// Signals readiness immediately on connect. Each audio frame is echoed
/// back as a partial transcript of the frame bytes followed by a final
/// transcript with a trailing period.
struct MockTranscriber {
    events_tx: tokio::sync::mpsc::Sender<TranscriberEvent>,
    stats: Arc<MockStats>,
    ready: bool,
}

#[async_trait::async_trait]
impl Transcriber for MockTranscriber {
    async fn connect(&mut self) -> Result<(), TranscriberError> {
        self.ready = true;
        self.events_tx
            .send(TranscriberEvent::Ready)
            .await
            .map_err(|_| TranscriberError::ConnectionFailed("event channel closed".to_string()))
    }

    async fn send_audio(&mut self, frame: Bytes) -> Result<(), TranscriberError> {
        self.stats.frames.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(&frame).to_string();
        let _ = self
            .events_tx
            .send(TranscriberEvent::Partial(text.clone()))
            .await;
        let _ = self
            .events_tx
            .send(TranscriberEvent::Final(format!("{text}.")))
            .await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TranscriberError> {
        if self.ready {
            self.ready = false;
            self.stats.finishes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn provider_info(&self) -> &'static str {
        "Mock STT"
    }
}

fn mock_factory(stats: Arc<MockStats>) -> TranscriberFactory {
    Arc::new(move |config: TranscriberConfig, events_tx| {
        stats.opens.fetch_add(1, Ordering::SeqCst);
        stats
            .last_sample_rate
            .store(config.sample_rate as usize, Ordering::SeqCst);
        Ok(Box::new(MockTranscriber {
            events_tx,
            stats: stats.clone(),
            ready: false,
        }) as Box<dyn Transcriber>)
    })
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        deepgram_api_key: "test_key".to_string(),
        language: "en".to_string(),
        model: "nova-2".to_string(),
        cors_allowed_origins: None,
    }
}

/// Start a server on an ephemeral port with a mock backend injected
async fn start_test_server() -> (SocketAddr, Arc<MockStats>) {
    let stats = Arc::new(MockStats::default());
    let app_state = AppState::with_factory(test_config(), mock_factory(stats.clone()));
    let app = routes::ws::create_ws_router().with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get address");

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.ok();
    });

    (addr, stats)
}

async fn connect_client(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/stream");
    let (ws, _) = timeout(Duration::from_secs(5), connect_async(&url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

/// Read the next text message as JSON, skipping control frames
async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("recv timed out")
            .expect("connection closed")
            .expect("recv failed");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("invalid JSON from server");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert that no message arrives within the grace window
async fn expect_silence(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(Ok(msg))) = timeout(window, ws.next()).await {
        panic!("expected no message, got {msg:?}");
    }
}

/// Poll a counter until it reaches the expected value or the deadline passes
async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
    for _ in 0..50 {
        if counter.load(Ordering::SeqCst) == expected {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(counter.load(Ordering::SeqCst), expected);
}

// =============================================================================
// Full session flow
// =============================================================================

/// Configure, stream audio, receive transcripts, stop
#[tokio::test]
async fn test_full_session_flow() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 8000})).await;

    let ready = recv_json(&mut ws).await;
    assert_eq!(ready["type"], "transcriber-ready");
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
    assert_eq!(stats.last_sample_rate.load(Ordering::SeqCst), 8000);

    ws.send(Message::Binary(Bytes::from_static(b"hello")))
        .await
        .unwrap();

    let partial = recv_json(&mut ws).await;
    assert_eq!(partial["type"], "partial");
    assert_eq!(partial["text"], "hello");

    let final_msg = recv_json(&mut ws).await;
    assert_eq!(final_msg["type"], "final");
    assert_eq!(final_msg["text"], "hello.");
    assert!(!final_msg["text"].as_str().unwrap().is_empty());

    send_json(&mut ws, json!({"type": "stop-stream"})).await;
    wait_for_count(&stats.finishes, 1).await;

    ws.close(None).await.ok();
}

/// Multiple audio frames arrive at the provider in order
#[tokio::test]
async fn test_audio_frames_forwarded_in_order() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");

    for word in ["one", "two", "three"] {
        ws.send(Message::Binary(Bytes::copy_from_slice(word.as_bytes())))
            .await
            .unwrap();
    }

    for word in ["one", "two", "three"] {
        let partial = recv_json(&mut ws).await;
        assert_eq!(partial["type"], "partial");
        assert_eq!(partial["text"], word);
        let final_msg = recv_json(&mut ws).await;
        assert_eq!(final_msg["type"], "final");
        assert_eq!(final_msg["text"], format!("{word}."));
    }

    assert_eq!(stats.frames.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Configure semantics
// =============================================================================

/// A duplicate configure is ignored and opens no second provider session
#[tokio::test]
async fn test_duplicate_configure_ignored() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 44100})).await;
    expect_silence(&mut ws, Duration::from_millis(300)).await;

    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
    assert_eq!(stats.last_sample_rate.load(Ordering::SeqCst), 16000);

    // Session still streams normally after the ignored configure
    ws.send(Message::Binary(Bytes::from_static(b"still here")))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut ws).await["text"], "still here");
}

/// An invalid sample rate produces an error without opening a provider,
/// and the session remains configurable afterwards
#[tokio::test]
async fn test_invalid_sample_rate_rejected() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": ""})).await;

    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(!error["message"].as_str().unwrap().is_empty());
    assert_eq!(stats.opens.load(Ordering::SeqCst), 0);

    // Recovery path: a valid configure on the same connection succeeds
    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 48000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
}

/// Missing sample rate is treated the same as an invalid one
#[tokio::test]
async fn test_missing_sample_rate_rejected() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream"})).await;

    let error = recv_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(stats.opens.load(Ordering::SeqCst), 0);
}

/// An unknown message type is reported without dropping the connection
#[tokio::test]
async fn test_unknown_message_type_reports_error() {
    let (addr, _stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "bogus"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "error");

    // Connection survives and accepts a valid configure
    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");
}

// =============================================================================
// Stop semantics
// =============================================================================

/// Stop before configure is a silent no-op
#[tokio::test]
async fn test_stop_without_provider_is_noop() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "stop-stream"})).await;
    expect_silence(&mut ws, Duration::from_millis(300)).await;
    assert_eq!(stats.finishes.load(Ordering::SeqCst), 0);

    // Session is still usable
    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");
}

/// Stop closes the provider session; a later configure opens a fresh one
#[tokio::test]
async fn test_reconfigure_after_stop() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");

    send_json(&mut ws, json!({"type": "stop-stream"})).await;
    wait_for_count(&stats.finishes, 1).await;

    // Audio between sessions is dropped rather than erroring
    ws.send(Message::Binary(Bytes::from_static(b"dropped")))
        .await
        .unwrap();
    expect_silence(&mut ws, Duration::from_millis(300)).await;
    assert_eq!(stats.frames.load(Ordering::SeqCst), 0);

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 44100})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");
    assert_eq!(stats.opens.load(Ordering::SeqCst), 2);
    assert_eq!(stats.last_sample_rate.load(Ordering::SeqCst), 44100);
}

// =============================================================================
// Disconnect cleanup
// =============================================================================

/// Dropping the client connection finishes the provider session promptly
#[tokio::test]
async fn test_disconnect_closes_provider() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");
    assert_eq!(stats.finishes.load(Ordering::SeqCst), 0);

    drop(ws);
    wait_for_count(&stats.finishes, 1).await;
}

/// An explicit close frame also finishes the provider session
#[tokio::test]
async fn test_close_frame_closes_provider() {
    let (addr, stats) = start_test_server().await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "transcriber-ready");

    ws.close(None).await.unwrap();
    wait_for_count(&stats.finishes, 1).await;
}

// =============================================================================
// Session isolation
// =============================================================================

/// Concurrent connections get independent provider sessions and only
/// receive their own transcripts
#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let (addr, stats) = start_test_server().await;
    let mut ws_a = connect_client(addr).await;
    let mut ws_b = connect_client(addr).await;

    send_json(&mut ws_a, json!({"type": "configure-stream", "sampleRate": 8000})).await;
    assert_eq!(recv_json(&mut ws_a).await["type"], "transcriber-ready");
    send_json(&mut ws_b, json!({"type": "configure-stream", "sampleRate": 16000})).await;
    assert_eq!(recv_json(&mut ws_b).await["type"], "transcriber-ready");

    assert_eq!(stats.opens.load(Ordering::SeqCst), 2);

    ws_a.send(Message::Binary(Bytes::from_static(b"alpha")))
        .await
        .unwrap();
    ws_b.send(Message::Binary(Bytes::from_static(b"bravo")))
        .await
        .unwrap();

    let a_partial = recv_json(&mut ws_a).await;
    assert_eq!(a_partial["type"], "partial");
    assert_eq!(a_partial["text"], "alpha");
    assert_eq!(recv_json(&mut ws_a).await["text"], "alpha.");

    let b_partial = recv_json(&mut ws_b).await;
    assert_eq!(b_partial["type"], "partial");
    assert_eq!(b_partial["text"], "bravo");
    assert_eq!(recv_json(&mut ws_b).await["text"], "bravo.");

    // Neither side has extra messages queued from the other session
    expect_silence(&mut ws_a, Duration::from_millis(200)).await;
    expect_silence(&mut ws_b, Duration::from_millis(200)).await;
}

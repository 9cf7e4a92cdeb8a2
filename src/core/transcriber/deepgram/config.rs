//! Configuration for the Deepgram streaming STT API.

use url::form_urlencoded;

use super::super::TranscriberConfig;

/// Deepgram live transcription WebSocket endpoint.
pub const DEEPGRAM_WS_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Host name for the WebSocket handshake headers.
pub const DEEPGRAM_HOST: &str = "api.deepgram.com";

/// Configuration for one Deepgram streaming connection.
///
/// Wraps the provider-agnostic [`TranscriberConfig`] with the stream
/// parameters Deepgram expects as query arguments. The encoding is always
/// linear PCM16; `endpointing` is disabled so utterance boundaries come
/// purely from `is_final`/`speech_final` flags.
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    /// Provider-agnostic configuration (API key, language, sample rate...).
    pub base: TranscriberConfig,
    /// Emit interim (partial) results while an utterance is in progress.
    pub interim_results: bool,
    /// Apply Deepgram smart formatting (numbers, dates, currency).
    pub smart_format: bool,
    /// Endpointing silence threshold in ms; 0 disables server-side endpointing.
    pub endpointing: u32,
}

impl DeepgramConfig {
    /// Build a configuration from the provider-agnostic base.
    pub fn from_base(base: TranscriberConfig) -> Self {
        Self {
            base,
            interim_results: true,
            smart_format: true,
            endpointing: 0,
        }
    }

    /// Build the WebSocket URL with query parameters.
    pub fn build_websocket_url(&self) -> String {
        // URL-encode helper for caller-supplied values
        fn encode(s: &str) -> String {
            form_urlencoded::byte_serialize(s.as_bytes()).collect()
        }

        let mut url = String::with_capacity(256);

        url.push_str(DEEPGRAM_WS_URL);

        url.push_str("?model=");
        url.push_str(&encode(&self.base.model));

        url.push_str("&language=");
        url.push_str(&encode(&self.base.language));

        url.push_str("&punctuate=");
        url.push_str(if self.base.punctuate { "true" } else { "false" });

        url.push_str("&smart_format=");
        url.push_str(if self.smart_format { "true" } else { "false" });

        url.push_str("&interim_results=");
        url.push_str(if self.interim_results { "true" } else { "false" });

        url.push_str("&endpointing=");
        url.push_str(&self.endpointing.to_string());

        url.push_str("&encoding=");
        url.push_str(&self.base.encoding);

        url.push_str("&sample_rate=");
        url.push_str(&self.base.sample_rate.to_string());

        url.push_str("&channels=");
        url.push_str(&self.base.channels.to_string());

        url
    }
}

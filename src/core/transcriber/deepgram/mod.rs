//! Deepgram streaming STT adapter.
//!
//! Wraps one live connection to the Deepgram `/v1/listen` WebSocket API and
//! translates its message vocabulary into [`super::TranscriberEvent`]s.

mod client;
mod config;
mod messages;

pub use client::DeepgramTranscriber;
pub use config::DeepgramConfig;
pub use messages::DeepgramMessage;

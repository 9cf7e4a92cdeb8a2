//! Streaming transcription WebSocket endpoint.

mod handler;
pub mod messages;
pub mod session;

pub use handler::stream_handler;
pub use messages::{IncomingMessage, MessageRoute, OutgoingMessage};
pub use session::{Session, SessionState, TaggedEvent};

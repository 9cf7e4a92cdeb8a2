pub mod transcriber;

// Re-export commonly used types for convenience
pub use transcriber::{
    DeepgramConfig, DeepgramTranscriber, Transcriber, TranscriberConfig, TranscriberError,
    TranscriberEvent, TranscriberFactory, deepgram_factory,
};

//! Shared application state
//!
//! Holds the server configuration and the transcriber factory used to open
//! a provider session per WebSocket connection. The factory is injectable
//! so tests can substitute an instrumented implementation.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::transcriber::{TranscriberConfig, TranscriberFactory, deepgram_factory};

/// Shared application state passed to all handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Factory that opens a provider transcription session
    pub transcriber_factory: TranscriberFactory,
}

impl AppState {
    /// Create application state backed by the Deepgram streaming provider
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            transcriber_factory: deepgram_factory(),
        })
    }

    /// Create application state with a custom transcriber factory
    pub fn with_factory(config: ServerConfig, factory: TranscriberFactory) -> Arc<Self> {
        Arc::new(Self {
            config,
            transcriber_factory: factory,
        })
    }

    /// Build the provider configuration template for a new session.
    ///
    /// The sample rate is filled in later from the client's configure
    /// message; everything else comes from server configuration.
    pub fn transcriber_config(&self) -> TranscriberConfig {
        TranscriberConfig {
            api_key: self.config.deepgram_api_key.clone(),
            language: self.config.language.clone(),
            model: self.config.model.clone(),
            ..TranscriberConfig::default()
        }
    }
}

//! Configuration module for the Scribe gateway
//!
//! This module handles server configuration from environment variables,
//! with `.env` files loaded beforehand by the binary. Priority: process
//! environment > `.env` values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use scribe_gateway::config::ServerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Default port when `PORT` is not set
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind host when `HOST` is not set
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable is present but could not be parsed
    #[error("invalid value for {var}: {message}")]
    InvalidVar {
        var: &'static str,
        message: String,
    },
}

/// Server configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind the server to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Deepgram API key used to open streaming transcription sessions
    pub deepgram_api_key: String,
    /// Transcription language passed to the provider
    pub language: String,
    /// Transcription model passed to the provider
    pub model: String,
    /// Comma-separated list of allowed CORS origins, or `*` for any.
    /// `None` means same-origin only.
    pub cors_allowed_origins: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `HOST`: bind address (default `0.0.0.0`)
    /// - `PORT`: listen port (default `8080`)
    /// - `DEEPGRAM_API_KEY`: provider API key (required)
    /// - `TRANSCRIBE_LANGUAGE`: language code (default `en`)
    /// - `TRANSCRIBE_MODEL`: provider model (default `nova-2`)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins or `*` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidVar {
                var: "PORT",
                message: e.to_string(),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingVar("DEEPGRAM_API_KEY"))?;

        let language =
            std::env::var("TRANSCRIBE_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let model = std::env::var("TRANSCRIBE_MODEL").unwrap_or_else(|_| "nova-2".to_string());

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            host,
            port,
            deepgram_api_key,
            language,
            model,
            cors_allowed_origins,
        })
    }

    /// Full socket address string for binding, e.g. `0.0.0.0:8080`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

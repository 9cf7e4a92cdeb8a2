use std::net::SocketAddr;

use tracing::info;

use axum::Router;
use clap::Parser;
use http::{Method, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use scribe_gateway::{ServerConfig, routes, state::AppState};

/// Scribe Gateway - Real-time speech transcription relay
#[derive(Parser, Debug)]
#[command(name = "scribe-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host address to bind to (overrides HOST)
    #[arg(long = "host", value_name = "ADDR")]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from the environment, with CLI overrides
    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let address = config.address();
    let cors_origins = config.cors_allowed_origins.clone();
    println!("Starting server on {address}");

    // Create application state
    let app_state = AppState::new(config);

    // Streaming transcription WebSocket routes
    let ws_routes = routes::ws::create_ws_router();

    // Public health check route
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(scribe_gateway::handlers::api::health_check),
    );

    // Configure CORS
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(false)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true)
        }
    } else {
        // No CORS configured - strict same-origin only. Cross-origin requests
        // will be blocked unless CORS_ALLOWED_ORIGINS is set.
        info!(
            "CORS not configured, defaulting to same-origin only. \
             Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
        );
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(false)
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = public_routes
        .merge(ws_routes)
        .with_state(app_state)
        .layer(cors_layer)
        .layer(security_headers);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", socket_addr, e))?;

    println!("Server listening on http://{socket_addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    Ok(())
}

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use toolgate_mcp::{Connector, McpConnector};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    model::{ModelBackend, ModelError, OpenAiCompatibleBackend},
    routers::{chat, health, status},
};

/// Transcripts may carry inline file parts.
const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<chat::TurnOrchestrator>,
    pub connector: Arc<dyn Connector>,
    pub config: Arc<ServerConfig>,
    /// Cancelled on shutdown; each turn runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        connector: Arc<dyn Connector>,
        model: Arc<dyn ModelBackend>,
    ) -> Self {
        let orchestrator = Arc::new(chat::TurnOrchestrator::new(
            connector.clone(),
            model,
            config.max_tool_steps,
        ));
        Self {
            orchestrator,
            connector,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat", post(chat::chat))
        .route("/api/mcp/status", post(status::mcp_status))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE))
        .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let connector: Arc<dyn Connector> = Arc::new(McpConnector::new(config.connect_timeout()));
    let model: Arc<dyn ModelBackend> = Arc::new(OpenAiCompatibleBackend::new(
        config.model_base_url.clone(),
        config.api_key.clone(),
    )?);
    if config.api_key.is_none() {
        warn!("No server API key configured; requests must supply apiKeys");
    }

    let addr = config.bind_addr();
    let state = AppState::new(config, connector, model);
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "toolgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(ServerError::Serve)
}

/// Resolve on Ctrl+C or SIGTERM, cancelling in-flight turns.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
    token.cancel();
}

//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to the bridge and the flow engine. This
//! module provides router construction and server startup.

use std::sync::Arc;

use thiserror::Error;

use crate::bridge::registry::SessionRegistry;
use crate::flow::FlowServices;
use crate::services::speech::SpeechServices;
use crate::services::stats::StatsWriter;
use crate::state::Config;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper around the services; all business logic lives in the
/// bridge and flow modules.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Process-wide session registry, keyed by stream sid.
    pub registry: Arc<SessionRegistry>,
    /// Initial call-record writer.
    pub stats_writer: Arc<StatsWriter>,
    /// Backends for the flow engine (directory, search, info).
    pub flow_services: Arc<FlowServices>,
    /// Speech stack for the text chat endpoint; absent in deployments where
    /// only the media bridge runs.
    pub speech: Option<Arc<dyn SpeechServices>>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<SessionRegistry>,
        stats_writer: Arc<StatsWriter>,
        flow_services: Arc<FlowServices>,
        speech: Option<Arc<dyn SpeechServices>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            stats_writer,
            flow_services,
            speech,
        }
    }
}

/// Starts the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let port = state.config.bind_port;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    axum::serve(listener, app).await?;
    Ok(())
}

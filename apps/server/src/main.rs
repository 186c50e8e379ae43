//! Voila Server - standalone headless call-bridge server.
//!
//! Terminates the telephony WebSocket, bridges audio to the voice-agent
//! server, and exposes the escalation and health endpoints. Designed for
//! server deployments where the bridge runs as a background daemon.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use voila_core::flow::FlowServices;
use voila_core::services::info::NoInfoBackend;
use voila_core::{
    start_server, AppState, DirectoryClient, FuzzySearch, ServiceCatalog, SessionRegistry,
    StatsWriter,
};

use crate::config::ServerConfig;

/// Voila Server - telephony-to-voice-agent call bridge.
#[derive(Parser, Debug)]
#[command(name = "voila-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "VOILA_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "VOILA_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Voila Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    if config.agent_server_url.is_none() {
        bail!("PIPECAT_SERVER_URL is required (the voice-agent WebSocket base URL)");
    }

    let core_config = config.to_core_config();
    log::info!(
        "Configuration: bind_port={}, agent={}, stats={}",
        core_config.bind_port,
        core_config.agent_server_url,
        if core_config.database_url.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    // Shared services
    let registry = Arc::new(SessionRegistry::new());
    let stats_writer = Arc::new(StatsWriter::new(core_config.database_url.clone()));

    let catalog = Arc::new(ServiceCatalog::new(core_config.data_file_path.as_deref()));
    log::info!("Catalog loaded: {} services", catalog.service_count());

    let directory = Arc::new(DirectoryClient::new(
        config.directory_base_url.clone().unwrap_or_default(),
        config.directory_api_token.clone(),
    ));
    let flow_services = Arc::new(FlowServices {
        directory,
        search: Arc::new(FuzzySearch::new(catalog)),
        // Knowledge-base and pricing backends attach here when deployed
        // alongside the info services.
        info: Arc::new(NoInfoBackend),
    });

    let app_state = AppState::new(
        core_config,
        registry,
        stats_writer,
        flow_services,
        None,
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    server_handle.abort();
    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

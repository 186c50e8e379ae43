//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `VOILA_BIND_PORT`
    pub bind_port: u16,

    /// Base WebSocket URL of the voice-agent server.
    /// Override: `PIPECAT_SERVER_URL`
    pub agent_server_url: Option<String>,

    /// Assistant identifier recorded with each call.
    /// Override: `INFO_AGENT_ASSISTANT_ID`
    pub assistant_id: Option<String>,

    /// Postgres DSN for the call-statistics row.
    /// Override: `DATABASE_URL` or the `DB_*` component variables.
    pub database_url: Option<String>,

    /// Override path for the service catalog JSON.
    /// Override: `DATA_FILE_PATH`
    pub data_file_path: Option<String>,

    /// Base URL of the healthcare directory API.
    /// Override: `DIRECTORY_BASE_URL`
    pub directory_base_url: Option<String>,

    /// Bearer token for the directory API.
    /// Override: `DIRECTORY_API_TOKEN`
    pub directory_api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            agent_server_url: None,
            assistant_id: None,
            database_url: None,
            data_file_path: None,
            directory_base_url: None,
            directory_api_token: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VOILA_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("PIPECAT_SERVER_URL") {
            if !val.is_empty() {
                self.agent_server_url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("INFO_AGENT_ASSISTANT_ID") {
            if !val.is_empty() {
                self.assistant_id = Some(val);
            }
        }
        if let Some(url) = voila_core::Config::database_url_from_env() {
            self.database_url = Some(url);
        }
        if let Ok(val) = std::env::var("DATA_FILE_PATH") {
            if !val.is_empty() {
                self.data_file_path = Some(val);
            }
        }
        if let Ok(val) = std::env::var("DIRECTORY_BASE_URL") {
            if !val.is_empty() {
                self.directory_base_url = Some(val);
            }
        }
        if let Ok(val) = std::env::var("DIRECTORY_API_TOKEN") {
            if !val.is_empty() {
                self.directory_api_token = Some(val);
            }
        }
    }

    /// Converts to voila-core's Config type.
    pub fn to_core_config(&self) -> voila_core::Config {
        let defaults = voila_core::Config::default();
        voila_core::Config {
            bind_port: self.bind_port,
            agent_server_url: self
                .agent_server_url
                .clone()
                .unwrap_or(defaults.agent_server_url),
            assistant_id: self.assistant_id.clone().unwrap_or(defaults.assistant_id),
            database_url: self.database_url.clone(),
            data_file_path: self.data_file_path.clone(),
            ..defaults
        }
    }
}

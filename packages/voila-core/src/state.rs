//! Core configuration types for the bridge.

use serde::{Deserialize, Serialize};

/// Tuning for the per-call media bridge.
///
/// Groups the audio-path parameters shared by both forwarders: sample rates
/// on each leg, framing, and the bound on the pre-activation audio buffer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Sample rate of the telephony leg (mu-law).
    pub telephony_sample_rate: u32,

    /// Sample rate of the voice-agent leg (linear PCM).
    pub agent_sample_rate: u32,

    /// Channel count on both legs.
    pub channels: u16,

    /// Frames held while the agent link is still being opened.
    /// Telephony sends 20 ms frames, so 100 frames is about 2 seconds.
    pub audio_buffer_frames: usize,

    /// Delay before escalation teardown begins, letting in-flight audio
    /// drain (milliseconds).
    pub escalation_drain_ms: u64,

    /// Delay between closing the agent link and declaring it closed
    /// (milliseconds).
    pub escalation_phase_ms: u64,
}

impl BridgeConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.telephony_sample_rate == 0 || self.agent_sample_rate == 0 {
            return Err("sample rates must be >= 1".to_string());
        }
        if self.channels == 0 {
            return Err("channels must be >= 1".to_string());
        }
        if self.audio_buffer_frames == 0 {
            return Err("audio_buffer_frames must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            telephony_sample_rate: 8_000,
            agent_sample_rate: 16_000,
            channels: 1,
            audio_buffer_frames: 100,
            escalation_drain_ms: 1_500,
            escalation_phase_ms: 2_000,
        }
    }
}

/// Configuration for the Voila bridge application.
///
/// All fields except the agent server URL have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server.
    pub bind_port: u16,

    /// Base WebSocket URL of the voice-agent server.
    /// Override: `PIPECAT_SERVER_URL` (required in production).
    pub agent_server_url: String,

    /// Assistant identifier recorded with each call.
    /// Override: `INFO_AGENT_ASSISTANT_ID`.
    pub assistant_id: String,

    // Bridge
    /// Media bridge tuning.
    #[serde(default)]
    pub bridge: BridgeConfig,

    // Agent link
    /// Ping interval on the agent WebSocket (seconds).
    pub agent_ping_interval_secs: u64,

    /// Ping timeout on the agent WebSocket (seconds).
    pub agent_ping_timeout_secs: u64,

    /// Close timeout on the agent WebSocket (seconds).
    pub agent_close_timeout_secs: u64,

    // Flow engine
    /// Maximum wait for an agent tool call per turn (seconds).
    pub tool_call_timeout_secs: u64,

    // Persistence
    /// Postgres DSN for the call-statistics row. `None` disables the writer.
    /// Override: `DATABASE_URL` or the `DB_*` component variables.
    #[serde(default)]
    pub database_url: Option<String>,

    // Catalog
    /// Override path for the service catalog JSON.
    /// Override: `DATA_FILE_PATH`.
    #[serde(default)]
    pub data_file_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            agent_server_url: "ws://localhost:8765".to_string(),
            assistant_id: "voila-piemonte-001".to_string(),
            bridge: BridgeConfig::default(),
            agent_ping_interval_secs: 20,
            agent_ping_timeout_secs: 10,
            agent_close_timeout_secs: 10,
            tool_call_timeout_secs: 45,
            database_url: None,
            data_file_path: None,
        }
    }
}

impl Config {
    /// Assembles a Postgres DSN from the `DB_*` component variables when
    /// `DATABASE_URL` is not set. Returns `None` if credentials are missing;
    /// the stats writer treats that as "persistence disabled".
    pub fn database_url_from_env() -> Option<String> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return Some(url);
            }
        }

        let host = std::env::var("DB_HOST").ok()?;
        let user = std::env::var("DB_USER").ok()?;
        let password = std::env::var("DB_PASSWORD").ok()?;
        let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let name = std::env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string());

        Some(format!(
            "postgresql://{}:{}@{}:{}/{}",
            user, password, host, port, name
        ))
    }
}

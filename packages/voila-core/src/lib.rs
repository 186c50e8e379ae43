//! Voila Core - shared library for the Voila call bridge.
//!
//! This crate implements a real-time mediation stack between a telephony
//! platform and a voice agent for healthcare appointment booking. It is
//! designed to be embedded by the standalone headless server.
//!
//! # Architecture
//!
//! - [`audio`]: mu-law/PCM transcoding and rate conversion
//! - [`bridge`]: per-call media bridge - peer links, session state machine,
//!   registry, escalation
//! - [`flow`]: conversational flow engine - node graph, manager, handlers
//! - [`services`]: catalog, fuzzy search, directory/booking APIs, patient
//!   lookup, scenario classification, stats persistence
//! - [`api`]: HTTP/WebSocket surface (telephony endpoint, escalation, chat)
//! - [`error`]: centralized error types
//!
//! # Abstraction traits
//!
//! External systems sit behind traits so tests can substitute them:
//!
//! - [`DirectoryApi`](services::DirectoryApi): the healthcare directory and
//!   booking backend
//! - [`SpeechServices`](services::SpeechServices): the ASR/LLM/TTS stack
//! - [`InfoBackend`](services::InfoBackend): knowledge base and pricing
//!   lookups

#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod bridge;
pub mod error;
pub mod flow;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{start_server, AppState, ServerError};
pub use bridge::{AgentLink, AgentLinkParams, BridgeSession, BridgeState, SessionRegistry};
pub use error::{BridgeError, BridgeResult};
pub use flow::manager::{FlowManager, TurnOutcome};
pub use flow::FlowServices;
pub use services::{
    DirectoryApi, DirectoryClient, FuzzySearch, InfoBackend, ServiceCatalog, SpeechServices,
    StatsWriter,
};
pub use state::{BridgeConfig, Config};
pub use utils::now_millis;

//! Centralized error types for the Voila bridge core.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Every kind carries an explicit recovery policy: transport losses end or
//! suspend a session depending on its phase, validation failures stay on the
//! current flow node, upstream double-failures route to an operator, and
//! persistence failures are logged and ignored. Nothing here escapes the
//! session supervisor as a panic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type for the bridge and flow engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A WebSocket or HTTP transport failed mid-stream.
    ///
    /// Fatal while a session is `Active`; expected and swallowed during the
    /// escalation phases.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A peer sent a frame we could not parse.
    ///
    /// Logged and dropped; the session continues.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A handler received arguments that fail validation (e.g. an empty
    /// phone number from the agent).
    ///
    /// The current flow node is retained and the failure is reflected back.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An upstream API stayed unavailable through its retry budget.
    ///
    /// Routes the caller to an operator transfer.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An operation was requested in a state that does not allow it
    /// (e.g. escalation on a non-active session).
    ///
    /// Reported to the caller without mutating state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Session state violates an internal invariant (e.g. a booking commit
    /// with no reserved slots).
    ///
    /// Emits an error node; the operation is not retried.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Writing the call-statistics row failed.
    ///
    /// Non-fatal: logged and ignored.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Requested session does not exist in the registry.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BridgeError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Protocol(_) => "protocol_error",
            Self::Validation(_) => "validation_error",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Precondition(_) => "precondition_failed",
            Self::Integrity(_) => "integrity_error",
            Self::Persistence(_) => "persistence_error",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Precondition(_) => StatusCode::CONFLICT,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when a transport loss is expected rather than fatal, i.e. the
    /// agent link was torn down deliberately during escalation.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<axum::Error> for BridgeError {
    fn from(err: axum::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_returns_correct_code() {
        let err = BridgeError::Validation("test".into());
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn precondition_error_maps_to_conflict() {
        let err = BridgeError::Precondition("not active".into());
        assert_eq!(err.code(), "precondition_failed");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_unavailable_maps_to_bad_gateway() {
        let err = BridgeError::UpstreamUnavailable("booking api".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}

//! HTTP route handlers and router construction.

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{ws, AppState};
use crate::bridge::escalation;
use crate::error::BridgeError;
use crate::flow::manager::{FlowManager, TurnOutcome};
use crate::flow::nodes::greeting::create_greeting_node;

/// Service identifier reported by the health endpoint.
const SERVICE_ID: &str = "pipecat-bridge";

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/escalation", post(handle_escalation))
        .route("/chat/send", post(handle_chat))
        .route("/talkdesk", get(ws::telephony_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": SERVICE_ID}))
}

/// Out-of-band escalation command from the voice-agent side.
///
/// Always answers 200 with a per-tool-call result list; failures surface as
/// result strings so the caller may retry.
async fn handle_escalation(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    log::info!("[Escalation] Endpoint hit");
    let response = escalation::handle_escalation(&state.registry, &state.config, payload).await;
    Json(response)
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    response: String,
}

/// Text chat endpoint for exercising the flow engine without a call.
///
/// Runs one dialog turn through a fresh flow manager with the same nodes
/// and tools the voice agent uses. Unavailable when no speech stack is
/// configured.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, BridgeError> {
    let Some(speech) = state.speech.clone() else {
        return Err(BridgeError::Configuration(
            "speech services not configured".into(),
        ));
    };

    log::info!(
        "[Chat] Request ({}): {:.80}",
        request.region.as_deref().unwrap_or("Piemonte"),
        request.message
    );

    let mut manager = FlowManager::new(
        state.flow_services.clone(),
        speech,
        "open",
        None,
        Duration::from_secs(state.config.tool_call_timeout_secs),
    );
    manager.initialize(create_greeting_node(None));

    let outcome = manager.process_turn(Some(&request.message)).await?;
    let response = match outcome {
        TurnOutcome::Spoke(text) => text,
        TurnOutcome::ToolHandled { result, .. } => result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Va bene.")
            .to_string(),
        TurnOutcome::TimedOut => "Nessuna risposta ricevuta.".to_string(),
    };

    Ok(Json(ChatResponse {
        success: true,
        response,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::registry::SessionRegistry;
    use crate::flow::FlowServices;
    use crate::services::catalog::ServiceCatalog;
    use crate::services::fuzzy::FuzzySearch;
    use crate::services::info::StaticInfoBackend;
    use crate::services::mock::MockDirectory;
    use crate::services::stats::StatsWriter;
    use crate::state::Config;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(
            Config::default(),
            Arc::new(SessionRegistry::new()),
            Arc::new(StatsWriter::disabled()),
            Arc::new(FlowServices {
                directory: Arc::new(MockDirectory::default()),
                search: Arc::new(FuzzySearch::new(Arc::new(ServiceCatalog::with_services(
                    vec![],
                )))),
                info: Arc::new(StaticInfoBackend::default()),
            }),
            None,
        )
    }

    #[tokio::test]
    async fn health_endpoint_reports_the_service_id() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_without_speech_stack_is_a_configuration_error() {
        let result = handle_chat(
            State(test_state()),
            Json(ChatRequest {
                message: "ciao".into(),
                region: None,
            }),
        )
        .await;

        let err = result.err().unwrap();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_endpoint_answers_every_payload() {
        let payload = json!({
            "message": {
                "call": {"id": "call-1"},
                "stream_sid": "MZnone",
                "toolCallList": [{"id": "tc-1", "function": {"arguments": {}}}]
            }
        });
        let response =
            handle_escalation(State(test_state()), Json(payload)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}

//! Escalation to a human operator.
//!
//! An out-of-band HTTP POST carries the agent's analysis of the call. The
//! controller looks the session up by stream sid, walks it through the
//! phased teardown, and delivers the final stop frame whose `ringGroup`
//! string routes the caller at the operator side.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::protocol::TelephonyOutgoing;
use crate::bridge::registry::SessionRegistry;
use crate::bridge::session::BridgeState;
use crate::state::Config;

/// Longest summary carried in the ring group string.
const MAX_SUMMARY_CHARS: usize = 240;

// ─────────────────────────────────────────────────────────────────────────────
// Request / response payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /escalation`.
#[derive(Debug, Deserialize)]
pub struct EscalationRequest {
    #[serde(default)]
    pub message: EscalationMessage,
}

#[derive(Debug, Deserialize, Default)]
pub struct EscalationMessage {
    #[serde(default)]
    pub call: CallRef,
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "toolCallList", default)]
    pub tool_call_list: Vec<ToolCall>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CallRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ToolCallFunction>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ToolCallFunction {
    #[serde(default)]
    pub arguments: Value,
}

/// Response body: one result per tool call, HTTP 200 on every handled path.
#[derive(Debug, Serialize)]
pub struct EscalationResponse {
    pub results: Vec<ToolCallResult>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: Option<String>,
    pub result: String,
}

impl EscalationRequest {
    fn results_with(&self, result: &str) -> EscalationResponse {
        let mut results: Vec<ToolCallResult> = self
            .message
            .tool_call_list
            .iter()
            .map(|tc| ToolCallResult {
                tool_call_id: tc.id.clone(),
                result: result.to_string(),
            })
            .collect();
        if results.is_empty() {
            results.push(ToolCallResult {
                tool_call_id: None,
                result: result.to_string(),
            });
        }
        EscalationResponse { results }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis extraction and the ring group string
// ─────────────────────────────────────────────────────────────────────────────

/// The agent's call analysis, with the defaults used when fields are
/// missing. An absent sector means the info desk (`2|2|n`).
#[derive(Debug, Clone)]
pub struct CallAnalysis {
    pub action: String,
    pub sentiment: String,
    pub duration_seconds: i64,
    pub summary: String,
    pub service: String,
    pub sector: String,
}

impl Default for CallAnalysis {
    fn default() -> Self {
        Self {
            action: "transfer".to_string(),
            sentiment: "neutral".to_string(),
            duration_seconds: 0,
            summary: "richiesta di assistenza".to_string(),
            service: "5".to_string(),
            sector: "info".to_string(),
        }
    }
}

impl CallAnalysis {
    /// Reads the analysis out of the first tool call's function arguments.
    /// Returns `None` when no arguments were passed at all.
    pub fn from_tool_calls(tool_calls: &[ToolCall]) -> Option<Self> {
        let args = tool_calls.first()?.function.as_ref()?.arguments.as_object()?;
        if args.is_empty() {
            return None;
        }

        let text = |key: &str, default: &str| -> String {
            args.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let duration_seconds = args
            .get("duration")
            .and_then(|v| match v {
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            })
            .unwrap_or(0);

        Some(Self {
            action: text("action", "transfer"),
            sentiment: text("sentiment", "neutral"),
            duration_seconds,
            summary: text("summary", "richiesta di assistenza"),
            service: text("service", "5").trim().to_string(),
            sector: text("sector", "info"),
        })
    }

    /// Formats the `ringGroup` service field: booking calls route as
    /// `1|1|<n>`, everything else as `2|2|<n>`.
    fn service_field(&self) -> String {
        let n = if self.service.is_empty() { "5" } else { &self.service };
        if self.sector == "booking" {
            format!("1|1|{}", n)
        } else {
            format!("2|2|{}", n)
        }
    }
}

/// Truncates a summary to at most 240 characters, cutting at the last space
/// so words stay whole.
pub fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }

    let truncated: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
    match truncated.rfind(' ') {
        Some(pos) => truncated[..pos].trim().to_string(),
        None => truncated.trim().to_string(),
    }
}

/// Builds the `::`-delimited operator routing string.
pub fn build_ring_group(analysis: &CallAnalysis) -> String {
    format!(
        "{}::{}::{}::{}::{}",
        truncate_summary(&analysis.summary),
        analysis.sentiment,
        analysis.action,
        analysis.duration_seconds,
        analysis.service_field(),
    )
}

/// Builds the final stop frame for a stream.
pub fn build_stop_frame(stream_sid: &str, analysis: &CallAnalysis) -> TelephonyOutgoing {
    let ring_group = build_ring_group(analysis);
    log::info!("[Escalation] Built ring group: {}", ring_group);
    TelephonyOutgoing::escalate(stream_sid, ring_group)
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Handles one escalation request end to end.
///
/// Every outcome maps to an HTTP 200 whose result string is the call id (or
/// an error description); a missing session simply returns so the caller
/// may retry.
pub async fn run_escalation(
    registry: &SessionRegistry,
    config: &Config,
    request: EscalationRequest,
) -> EscalationResponse {
    let Some(call_id) = request.message.call.id.clone() else {
        log::error!("[Escalation] Missing call id in payload");
        return request.results_with("Errore: call_id non trovato");
    };
    let response = request.results_with(&call_id);

    let Some(stream_sid) = request.message.stream_sid.clone() else {
        log::error!("[Escalation] No stream sid for call {}", call_id);
        return response;
    };

    let Some(session) = registry.lookup(&stream_sid) else {
        log::error!(
            "[Escalation] Session not found for stream {} (active: {:?})",
            stream_sid,
            registry.stream_sids()
        );
        return response;
    };

    log::info!(
        "[Escalation] Session {} found for stream {} (state: {})",
        session.session_id(),
        stream_sid,
        session.bridge_state().as_str()
    );

    // Let in-flight audio drain before tearing the agent link down.
    tokio::time::sleep(Duration::from_millis(config.bridge.escalation_drain_ms)).await;

    let analysis = CallAnalysis::from_tool_calls(&request.message.tool_call_list)
        .unwrap_or_else(|| {
            log::warn!("[Escalation] No analysis in payload, using defaults");
            CallAnalysis::default()
        });

    let outcome = async {
        session.start_escalation().await?;
        let stop_frame = build_stop_frame(&stream_sid, &analysis);
        session.complete_escalation(stop_frame).await
    }
    .await;

    match outcome {
        Ok(()) => {
            log::info!(
                "[Escalation] Completed for stream {} (call {})",
                stream_sid,
                call_id
            );
        }
        Err(e) => {
            log::error!("[Escalation] Error during escalation: {}", e);

            // Fallback: push a default-routed stop frame unless the session
            // is already gone.
            if session.bridge_state() != BridgeState::Closed {
                let fallback = build_stop_frame(&stream_sid, &CallAnalysis::default());
                match session.send_to_telephony(&fallback).await {
                    Ok(()) => log::info!("[Escalation] Fallback stop frame sent"),
                    Err(e) => log::error!("[Escalation] Fallback also failed: {}", e),
                }
            } else {
                log::error!("[Escalation] Session already closed, cannot send fallback");
            }
        }
    }

    response
}

/// Convenience wrapper used by the HTTP layer.
pub async fn handle_escalation(
    registry: &Arc<SessionRegistry>,
    config: &Config,
    payload: Value,
) -> EscalationResponse {
    match serde_json::from_value::<EscalationRequest>(payload) {
        Ok(request) => run_escalation(registry, config, request).await,
        Err(e) => {
            log::error!("[Escalation] Error parsing payload: {}", e);
            EscalationResponse {
                results: vec![ToolCallResult {
                    tool_call_id: Some("error".to_string()),
                    result: format!("Payload parse error: {}", e),
                }],
            }
        }
    }
}

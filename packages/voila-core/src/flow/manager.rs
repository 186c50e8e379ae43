//! Flow execution.
//!
//! The manager owns the current node, the flow state, and the conversation
//! history. Each turn it presents the node (plus the global tool set) to the
//! speech stack, waits for the agent's action under a timeout, dispatches
//! tool calls through the handler table, and applies the resulting
//! transition and context strategy.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::BridgeError;
use crate::flow::global::global_functions;
use crate::flow::handlers;
use crate::flow::node::{ContextStrategy, FunctionSchema, NodeConfig, Transition};
use crate::flow::nodes::completion::create_error_node;
use crate::flow::nodes::router::create_router_node;
use crate::flow::nodes::transfer::{create_transfer_node, TransferReason};
use crate::flow::state::{FailureKind, FlowState};
use crate::flow::{FlowContext, FlowServices};
use crate::services::speech::{AgentAction, PromptMessage, SpeechServices};

/// What one processed turn produced.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The agent answered in plain language (already spoken via TTS).
    Spoke(String),
    /// A tool call was dispatched; the result was reflected to the agent.
    ToolHandled { tool: String, result: Value },
    /// The agent produced nothing within the tool-call timeout.
    TimedOut,
}

/// Executes the conversation graph for one session.
pub struct FlowManager {
    current_node: NodeConfig,
    pub state: FlowState,
    services: Arc<FlowServices>,
    speech: Arc<dyn SpeechServices>,
    globals: Vec<FunctionSchema>,
    history: Vec<PromptMessage>,
    tool_timeout: Duration,
}

impl FlowManager {
    /// Creates a manager starting at the router node.
    pub fn new(
        services: Arc<FlowServices>,
        speech: Arc<dyn SpeechServices>,
        business_status: impl Into<String>,
        caller_phone: Option<String>,
        tool_timeout: Duration,
    ) -> Self {
        let business_status = business_status.into();
        let start = create_router_node(false, &business_status);
        Self {
            current_node: start,
            state: FlowState::new(business_status, caller_phone),
            services,
            speech,
            globals: global_functions(),
            history: Vec::new(),
            tool_timeout,
        }
    }

    /// Replaces the starting node (used by tests and the chat endpoint).
    pub fn initialize(&mut self, node: NodeConfig) {
        self.apply_node(node);
    }

    /// The node the dialog currently sits on.
    pub fn current_node(&self) -> &NodeConfig {
        &self.current_node
    }

    fn apply_node(&mut self, node: NodeConfig) {
        if node.context_strategy == ContextStrategy::Reset {
            log::debug!(
                "[Flow] Context reset on entering node '{}' ({} messages dropped)",
                node.name,
                self.history.len()
            );
            self.history.clear();
        }
        log::info!("[Flow] Node: {} -> {}", self.current_node.name, node.name);
        self.current_node = node;
    }

    /// Processes one turn: optional user utterance in, agent action out.
    pub async fn process_turn(
        &mut self,
        utterance: Option<&str>,
    ) -> crate::error::BridgeResult<TurnOutcome> {
        if let Some(text) = utterance {
            self.history.push(PromptMessage::user(text));
        }

        let prompt = self.current_node.to_prompt(&self.history, &self.globals);

        let action =
            match tokio::time::timeout(self.tool_timeout, self.speech.next_action(&prompt)).await
            {
                Ok(action) => action?,
                Err(_) => {
                    log::warn!(
                        "[Flow] No agent action within {:?} on node '{}'",
                        self.tool_timeout,
                        self.current_node.name
                    );
                    return Ok(TurnOutcome::TimedOut);
                }
            };

        match action {
            AgentAction::Say(text) => {
                let _ = self.speech.speak(&text).await;
                self.history.push(PromptMessage {
                    role: "assistant",
                    content: text.clone(),
                });
                Ok(TurnOutcome::Spoke(text))
            }
            AgentAction::ToolCall { name, arguments } => {
                self.handle_tool_call(name, arguments).await
            }
        }
    }

    async fn handle_tool_call(
        &mut self,
        name: String,
        arguments: Value,
    ) -> crate::error::BridgeResult<TurnOutcome> {
        log::info!(
            "[Flow] Tool call on '{}': {}({})",
            self.current_node.name,
            name,
            arguments
        );

        let mut ctx = FlowContext {
            state: &mut self.state,
            services: &self.services,
            speech: &self.speech,
        };

        let (result, transition) = match handlers::dispatch(&name, arguments, &mut ctx).await {
            Ok(outcome) => outcome,
            Err(BridgeError::Validation(message)) => {
                // Bad arguments keep the node; the failure is reflected back
                // so the agent can re-ask.
                log::warn!("[Flow] Validation failure in {}: {}", name, message);
                (
                    serde_json::json!({"success": false, "message": message}),
                    Transition::StayOnNode,
                )
            }
            Err(BridgeError::Integrity(message)) => {
                log::error!("[Flow] Integrity violation in {}: {}", name, message);
                (
                    serde_json::json!({"success": false, "message": message}),
                    Transition::to(create_error_node(&message)),
                )
            }
            Err(e) => {
                // Upstream trouble: count a technical failure and hand off
                // once the budget runs out. Outside opening hours there is
                // no operator to hand off to, so the error node takes over.
                log::error!("[Flow] Handler {} failed: {}", name, e);
                let should_transfer = self.state.failures.record(FailureKind::Technical);
                let transition = if should_transfer {
                    if crate::bridge::protocol::transfers_blocked(&self.state.business_status) {
                        Transition::to(create_error_node(
                            "Si è verificato un problema tecnico. La invito a richiamare \
                             più tardi.",
                        ))
                    } else {
                        Transition::to(create_transfer_node(TransferReason::Technical))
                    }
                } else {
                    Transition::StayOnNode
                };
                (
                    serde_json::json!({
                        "success": false,
                        "message": "A technical problem occurred. Please try again.",
                    }),
                    transition,
                )
            }
        };

        self.history
            .push(PromptMessage::function_result(result.to_string()));

        if let Transition::TransitionTo(node) = transition {
            self.apply_node(node);
        }

        Ok(TurnOutcome::ToolHandled { tool: name, result })
    }
}

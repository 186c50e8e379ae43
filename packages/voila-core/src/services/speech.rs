//! Speech capability boundary.
//!
//! The ASR, LLM, and TTS adapters live outside this crate; the flow engine
//! reaches them through [`SpeechServices`]. One call presents the current
//! node (messages plus tool schemas) and returns the agent's next action;
//! the other streams a phrase to the caller's audio path.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BridgeResult;

/// One message presented to the language model.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn function_result(content: impl Into<String>) -> Self {
        Self {
            role: "tool",
            content: content.into(),
        }
    }
}

/// A tool the agent may call on this turn.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema: `{"properties": …, "required": […]}`.
    pub parameters: Value,
}

/// Everything presented to the agent for one turn.
#[derive(Debug, Clone)]
pub struct ConversationPrompt {
    pub node_name: &'static str,
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolDescriptor>,
}

/// What the agent decided to do.
#[derive(Debug, Clone)]
pub enum AgentAction {
    /// Invoke a tool by name with JSON arguments.
    ToolCall { name: String, arguments: Value },
    /// Answer in plain language.
    Say(String),
}

/// External speech stack: utterance in, action out, plus TTS.
#[async_trait]
pub trait SpeechServices: Send + Sync {
    /// Presents the node and awaits the agent's next action.
    async fn next_action(&self, prompt: &ConversationPrompt) -> BridgeResult<AgentAction>;

    /// Streams a phrase to the caller (used for fillers while a lookup
    /// runs).
    async fn speak(&self, text: &str) -> BridgeResult<()>;
}

/// Scripted speech stack for tests: pops pre-planned actions and records
/// everything spoken.
pub struct ScriptedSpeech {
    actions: parking_lot::Mutex<std::collections::VecDeque<AgentAction>>,
    pub spoken: parking_lot::Mutex<Vec<String>>,
    pub prompts_seen: parking_lot::Mutex<Vec<&'static str>>,
}

impl ScriptedSpeech {
    pub fn new(actions: Vec<AgentAction>) -> Self {
        Self {
            actions: parking_lot::Mutex::new(actions.into()),
            spoken: parking_lot::Mutex::new(Vec::new()),
            prompts_seen: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a single scripted tool call.
    pub fn tool_call(name: &str, arguments: Value) -> AgentAction {
        AgentAction::ToolCall {
            name: name.to_string(),
            arguments,
        }
    }
}

#[async_trait]
impl SpeechServices for ScriptedSpeech {
    async fn next_action(&self, prompt: &ConversationPrompt) -> BridgeResult<AgentAction> {
        self.prompts_seen.lock().push(prompt.node_name);
        match self.actions.lock().pop_front() {
            Some(action) => Ok(action),
            None => Ok(AgentAction::Say("(silenzio)".to_string())),
        }
    }

    async fn speak(&self, text: &str) -> BridgeResult<()> {
        self.spoken.lock().push(text.to_string());
        Ok(())
    }
}

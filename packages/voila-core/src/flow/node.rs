//! Conversation nodes as data.
//!
//! A node bundles the system messages presented to the agent with the tool
//! schemas callable at that point of the dialog. Nodes are plain structs so
//! context strategies and `respond_immediately` flags stay inspectable;
//! transitions carry the next node by value.

use serde_json::Value;

use crate::services::speech::{ConversationPrompt, PromptMessage, ToolDescriptor};

/// What happens to the accumulated conversation when a node is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextStrategy {
    /// Keep prior messages and append the node's own.
    #[default]
    Append,
    /// Drop prior messages first. Used where the previous conversation's
    /// verbosity would flood the context window (e.g. entering patient
    /// detail collection after a slot search).
    Reset,
}

/// A tool schema attached to a node. The handler is referenced by name and
/// resolved through the dispatch table.
#[derive(Debug, Clone)]
pub struct FunctionSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema `properties`.
    pub properties: Value,
    pub required: &'static [&'static str],
}

impl FunctionSchema {
    pub fn new(
        name: &'static str,
        description: &'static str,
        properties: Value,
        required: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            description,
            properties,
            required,
        }
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name,
            description: self.description,
            parameters: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// One conversation node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: &'static str,
    pub role_messages: Vec<String>,
    pub task_messages: Vec<String>,
    pub functions: Vec<FunctionSchema>,
    /// The agent speaks first on entering this node.
    pub respond_immediately: bool,
    pub context_strategy: ContextStrategy,
}

impl NodeConfig {
    /// Starts building a node with the given name.
    pub fn named(name: &'static str) -> NodeBuilder {
        NodeBuilder {
            node: NodeConfig {
                name,
                role_messages: Vec::new(),
                task_messages: Vec::new(),
                functions: Vec::new(),
                respond_immediately: false,
                context_strategy: ContextStrategy::Append,
            },
        }
    }

    /// Flattens this node plus the shared tool set into one prompt.
    pub fn to_prompt(
        &self,
        history: &[PromptMessage],
        global_functions: &[FunctionSchema],
    ) -> ConversationPrompt {
        let mut messages: Vec<PromptMessage> = Vec::new();
        if self.context_strategy == ContextStrategy::Append {
            messages.extend_from_slice(history);
        }
        for content in &self.role_messages {
            messages.push(PromptMessage::system(content.clone()));
        }
        for content in &self.task_messages {
            messages.push(PromptMessage::system(content.clone()));
        }

        let tools = self
            .functions
            .iter()
            .chain(global_functions.iter())
            .map(FunctionSchema::descriptor)
            .collect();

        ConversationPrompt {
            node_name: self.name,
            messages,
            tools,
        }
    }

    /// True when this node exposes a tool with the given name.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }
}

/// Builder keeping node constructors terse.
pub struct NodeBuilder {
    node: NodeConfig,
}

impl NodeBuilder {
    pub fn role(mut self, content: impl Into<String>) -> Self {
        self.node.role_messages.push(content.into());
        self
    }

    pub fn task(mut self, content: impl Into<String>) -> Self {
        self.node.task_messages.push(content.into());
        self
    }

    pub fn function(mut self, schema: FunctionSchema) -> Self {
        self.node.functions.push(schema);
        self
    }

    pub fn respond_immediately(mut self) -> Self {
        self.node.respond_immediately = true;
        self
    }

    pub fn reset_context(mut self) -> Self {
        self.node.context_strategy = ContextStrategy::Reset;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

/// Handler outcome: stay on the current node or move to the next one.
#[derive(Debug, Clone)]
pub enum Transition {
    StayOnNode,
    TransitionTo(NodeConfig),
}

impl Transition {
    pub fn to(node: NodeConfig) -> Self {
        Self::TransitionTo(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_node() -> NodeConfig {
        NodeConfig::named("sample")
            .role("You collect things.")
            .task("Ask for the thing.")
            .function(FunctionSchema::new(
                "collect_thing",
                "Collect the thing",
                json!({"thing": {"type": "string"}}),
                &["thing"],
            ))
            .build()
    }

    #[test]
    fn append_strategy_keeps_history() {
        let node = sample_node();
        let history = vec![PromptMessage::user("ciao")];
        let prompt = node.to_prompt(&history, &[]);
        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages[0].role, "user");
    }

    #[test]
    fn reset_strategy_drops_history() {
        let node = NodeConfig::named("reset").task("t").reset_context().build();
        let history = vec![PromptMessage::user("ciao")];
        let prompt = node.to_prompt(&history, &[]);
        assert_eq!(prompt.messages.len(), 1);
        assert_eq!(prompt.messages[0].role, "system");
    }

    #[test]
    fn global_functions_join_node_tools() {
        let node = sample_node();
        let globals = vec![FunctionSchema::new("request_transfer", "Transfer", json!({}), &[])];
        let prompt = node.to_prompt(&[], &globals);
        assert_eq!(prompt.tools.len(), 2);
        assert_eq!(prompt.tools[1].name, "request_transfer");
    }

    #[test]
    fn descriptor_embeds_required_fields() {
        let node = sample_node();
        let prompt = node.to_prompt(&[], &[]);
        assert_eq!(prompt.tools[0].parameters["required"][0], "thing");
    }
}

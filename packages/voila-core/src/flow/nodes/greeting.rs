//! Booking greeting node.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;

/// Schema of the fuzzy service search, shared by every node that can start
/// a search.
pub fn search_function() -> FunctionSchema {
    FunctionSchema::new(
        "search_health_services",
        "Search health services using fuzzy search",
        json!({
            "search_term": {
                "type": "string",
                "description": "Name of the service to search for (e.g. 'cardiologia', 'analisi del sangue', 'rx caviglia')"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum number of results to return (default: 3, maximum: 5)",
                "default": 3,
                "minimum": 1,
                "maximum": 5
            }
        }),
        &["search_term"],
    )
}

/// Entry of the booking dialog.
///
/// Context is reset here: the router prompt's aggressive tool instructions
/// would otherwise cause global-function misfires throughout the booking.
pub fn create_greeting_node(initial_request: Option<&str>) -> NodeConfig {
    let task = match initial_request {
        Some(request) => format!(
            "The user already asked to book: \"{request}\". IMMEDIATELY call \
             search_health_services with search_term=\"{request}\". Do not ask \
             again; acknowledge and search."
        ),
        None => "Say: 'Sono Ualà, assistente virtuale di Cerba HealthCare. Quale \
                 servizio vorresti prenotare?' When the user mentions ANY service \
                 name, immediately call search_health_services."
            .to_string(),
    };

    NodeConfig::named("greeting")
        .role(format!(
            "You are Ualà, a calm and friendly virtual assistant (female voice) for \
             Cerba Healthcare. Speak with warmth and clarity like a human, not like \
             a robot. {LANGUAGE_CONFIG}"
        ))
        .task(task)
        .function(search_function())
        .respond_immediately()
        .reset_context()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::ContextStrategy;

    #[test]
    fn prefilled_request_triggers_immediate_search() {
        let node = create_greeting_node(Some("RX Caviglia Destra"));
        assert!(node.task_messages[0].contains("RX Caviglia Destra"));
        assert!(node.has_function("search_health_services"));
    }

    #[test]
    fn greeting_resets_context_and_speaks_first() {
        let node = create_greeting_node(None);
        assert_eq!(node.context_strategy, ContextStrategy::Reset);
        assert!(node.respond_immediately);
    }
}

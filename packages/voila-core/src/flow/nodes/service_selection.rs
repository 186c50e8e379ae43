//! Service search result presentation and retry nodes.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::greeting::search_function;
use crate::flow::nodes::LANGUAGE_CONFIG;
use crate::services::types::HealthService;

/// Presents the top search results for the caller to choose from.
pub fn create_service_selection_node(
    services: &[HealthService],
    search_term: &str,
) -> NodeConfig {
    let options = services
        .iter()
        .take(3)
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    NodeConfig::named("service_selection")
        .role(format!(
            "Help the patient choose from the top search results; if none match, \
             they should say the full service name to refine the search. NEVER \
             number the options - list only the names. When calling select_service \
             or refine_search, call it IMMEDIATELY with no preceding text. \
             {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "I found these services for '{search_term}':\n\n{options}\n\nChoose one \
             of these services, or say the full service name if none of these match."
        ))
        .function(FunctionSchema::new(
            "select_service",
            "Select a specific service from search results",
            json!({
                "service_uuid": {
                    "type": "string",
                    "description": "UUID of the selected health service"
                }
            }),
            &["service_uuid"],
        ))
        .function(FunctionSchema::new(
            "refine_search",
            "Refine the search with a more specific service name",
            json!({
                "refined_search_term": {
                    "type": "string",
                    "description": "More specific service name for refined search"
                }
            }),
            &["refined_search_term"],
        ))
        .build()
}

/// Asks the caller to try the search again after a miss.
pub fn create_search_retry_node(error_message: &str) -> NodeConfig {
    NodeConfig::named("search_retry")
        .role(format!(
            "Help the patient try searching for the service again with a better \
             term. Call search_health_services immediately with no preceding text. \
             {LANGUAGE_CONFIG}"
        ))
        .task(format!("{error_message} Try searching with the full service name."))
        .function(search_function())
        .build()
}

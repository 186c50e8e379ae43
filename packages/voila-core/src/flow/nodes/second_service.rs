//! Nodes for booking a second service after the first one is scheduled.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;
use crate::services::types::HealthService;

/// Silent node: searches the catalog for the pending second-service request.
pub fn create_second_service_search_node() -> NodeConfig {
    NodeConfig::named("second_service_search")
        .role("Call perform_second_service_search immediately.")
        .task("Call perform_second_service_search now.")
        .function(FunctionSchema::new(
            "perform_second_service_search",
            "Search the catalog for the second requested service. Call immediately.",
            json!({}),
            &[],
        ))
        .build()
}

/// Presents second-service candidates.
pub fn create_second_service_selection_node(
    services: &[HealthService],
    search_term: &str,
) -> NodeConfig {
    let options = services
        .iter()
        .take(3)
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    NodeConfig::named("second_service_selection")
        .role(format!(
            "Help the patient choose the second service from the options; if none \
             match they should say the full service name. List only names, never \
             numbered. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "For '{search_term}' I found:\n\n{options}\n\nWhich one would you like?"
        ))
        .function(FunctionSchema::new(
            "select_second_service",
            "Select the second service from the search results",
            json!({
                "service_uuid": {
                    "type": "string",
                    "description": "UUID of the selected health service"
                }
            }),
            &["service_uuid"],
        ))
        .function(FunctionSchema::new(
            "refine_second_service_search",
            "Refine the second-service search with a more specific name",
            json!({
                "refined_search_term": {
                    "type": "string",
                    "description": "More specific service name"
                }
            }),
            &["refined_search_term"],
        ))
        .build()
}

/// Silent node: sorts the second service at the already-selected center.
pub fn create_second_service_sorting_node(service_name: &str) -> NodeConfig {
    NodeConfig::named("second_service_sorting")
        .role("Call perform_second_service_sorting immediately.")
        .task(format!(
            "Sto verificando la disponibilità per {service_name}. Attendi un momento. \
             Call perform_second_service_sorting now."
        ))
        .function(FunctionSchema::new(
            "perform_second_service_sorting",
            "Check the second service's availability at the selected center. Call immediately.",
            json!({}),
            &[],
        ))
        .build()
}

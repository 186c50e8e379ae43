//! Booking path nodes: center search and selection, service sorting,
//! membership, preferred date/time, and slot selection.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;
use crate::services::types::{AvailableSlot, HealthCenter};

/// Silent processing node: runs the center search immediately, no TTS.
pub fn create_center_search_node() -> NodeConfig {
    NodeConfig::named("center_search")
        .role("Call perform_center_search immediately.")
        .task("Call perform_center_search now.")
        .function(FunctionSchema::new(
            "perform_center_search",
            "Search health centers near the patient's address. Call immediately.",
            json!({}),
            &[],
        ))
        .build()
}

/// Presents nearby centers for the caller to pick.
pub fn create_center_selection_node(centers: &[HealthCenter]) -> NodeConfig {
    let options = centers
        .iter()
        .take(3)
        .map(|c| format!("{} - {}", c.name, c.city))
        .collect::<Vec<_>>()
        .join("\n");

    NodeConfig::named("center_selection")
        .role(format!(
            "Help the patient choose a health center from the options. List only \
             the center names, never numbered. When they choose, call select_center \
             immediately. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "I found these centers near you:\n\n{options}\n\nWhich one do you prefer?"
        ))
        .function(FunctionSchema::new(
            "select_center",
            "Select a health center from the presented options",
            json!({
                "center_uuid": {
                    "type": "string",
                    "description": "UUID of the selected health center"
                }
            }),
            &["center_uuid"],
        ))
        .build()
}

/// Silent processing node: sorts the selected services into appointment
/// groups at the chosen center.
pub fn create_sorting_node(service_name: &str) -> NodeConfig {
    NodeConfig::named("service_sorting")
        .role("Call perform_sorting immediately.")
        .task(format!(
            "Checking availability for {service_name}. Call perform_sorting now."
        ))
        .function(FunctionSchema::new(
            "perform_sorting",
            "Group the selected services into appointments at the chosen center. Call immediately.",
            json!({}),
            &[],
        ))
        .build()
}

/// Asks whether the caller holds a Cerba membership card.
pub fn create_cerba_membership_node() -> NodeConfig {
    NodeConfig::named("cerba_membership")
        .role(format!(
            "Ask if the patient holds a Cerba Card membership, which may change \
             pricing. Wait for an explicit yes/no before calling the function. \
             {LANGUAGE_CONFIG}"
        ))
        .task("Do you have a Cerba Card? Please say 'yes' or 'no'.")
        .function(FunctionSchema::new(
            "collect_cerba_membership",
            "Record whether the patient holds a Cerba Card",
            json!({
                "is_member": {
                    "type": "boolean",
                    "description": "true if the patient has a Cerba Card"
                }
            }),
            &["is_member"],
        ))
        .build()
}

/// Collects the preferred date and time for the current appointment group.
pub fn create_collect_datetime_node(service_name: &str, center_name: &str) -> NodeConfig {
    let where_part = if center_name.is_empty() {
        String::new()
    } else {
        format!(" at {center_name}")
    };

    NodeConfig::named("collect_datetime")
        .role(format!(
            "Collect the patient's preferred date and time for the appointment. \
             Convert natural language dates to YYYY-MM-DD and times to HH:MM \
             internally; a missing time preference is fine. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "When would you like to book {service_name}{where_part}? Tell me your \
             preferred day, and optionally a time."
        ))
        .function(FunctionSchema::new(
            "collect_datetime",
            "Collect preferred appointment date and optional time",
            json!({
                "preferred_date": {
                    "type": "string",
                    "description": "Preferred date in YYYY-MM-DD format"
                },
                "preferred_time": {
                    "type": "string",
                    "description": "Preferred time in HH:MM format, empty if no preference"
                }
            }),
            &["preferred_date"],
        ))
        .build()
}

/// Presents open slots and lets the caller reserve one.
pub fn create_slot_selection_node(slots: &[AvailableSlot], service_name: &str) -> NodeConfig {
    let options = slots
        .iter()
        .take(3)
        .map(|s| s.start_time.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    NodeConfig::named("slot_selection")
        .role(format!(
            "Present the available slots as natural spoken times and let the \
             patient pick one. When they choose, call select_slot with that slot's \
             availability UUID. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "These slots are available for {service_name}:\n\n{options}\n\nWhich one \
             works for you?"
        ))
        .function(FunctionSchema::new(
            "select_slot",
            "Reserve the chosen availability slot",
            json!({
                "slot_uuid": {
                    "type": "string",
                    "description": "Availability UUID of the chosen slot"
                }
            }),
            &["slot_uuid"],
        ))
        .build()
}

//! Patient detail collection nodes for booking finalization.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;

/// First-name collection.
///
/// Context is reset at this node to clear heavy slot data from the booking
/// search; only the essential summary survives into the detail collection.
pub fn create_collect_first_name_node() -> NodeConfig {
    NodeConfig::named("collect_first_name")
        .role(format!(
            "You are a healthcare booking agent collecting patient details. Collect \
             the patient's first name only (nome). Do NOT ask for the surname yet. \
             {LANGUAGE_CONFIG}"
        ))
        .task("What is your first name? (Solo il nome, per favore)")
        .function(FunctionSchema::new(
            "collect_first_name",
            "Collect the patient's first name only",
            json!({
                "first_name": {
                    "type": "string",
                    "description": "Patient's first name only (nome)"
                }
            }),
            &["first_name"],
        ))
        .reset_context()
        .build()
}

pub fn create_collect_surname_node() -> NodeConfig {
    NodeConfig::named("collect_surname")
        .role(format!(
            "Collect the patient's surname only (cognome). {LANGUAGE_CONFIG}"
        ))
        .task("And what is your surname? (E il cognome?)")
        .function(FunctionSchema::new(
            "collect_surname",
            "Collect the patient's surname only",
            json!({
                "surname": {
                    "type": "string",
                    "description": "Patient's surname only (cognome)"
                }
            }),
            &["surname"],
        ))
        .build()
}

/// Phone collection: the caller may confirm the number they are calling
/// from instead of dictating a new one.
pub fn create_collect_phone_node() -> NodeConfig {
    NodeConfig::named("collect_phone")
        .role(format!(
            "Collect the patient's phone number. Ask them to speak digit by digit, \
             slowly. IMPORTANT: when the user says 'yes', 'si' or 'sì' to confirm \
             the caller number, call collect_phone with their exact confirmation \
             word. {LANGUAGE_CONFIG}"
        ))
        .task(
            "Can you tell me if the phone you're calling from matches your official \
             number? If yes, just say 'yes'. If not, tell me your phone number digit \
             by digit. Slowly!",
        )
        .function(FunctionSchema::new(
            "collect_phone",
            "Collect the patient's phone number or their confirmation to use the \
             caller ID. ALWAYS pass the user's exact response in the phone parameter.",
            json!({
                "phone": {
                    "type": "string",
                    "description": "The exact user response: either their phone digits OR their confirmation word (yes/si/sì) to use the caller ID"
                }
            }),
            &["phone"],
        ))
        .build()
}

/// Confirmation of a dictated phone number.
pub fn create_confirm_phone_node(phone: &str) -> NodeConfig {
    let spelled = phone.chars().map(|c| c.to_string()).collect::<Vec<_>>().join(" ");

    NodeConfig::named("confirm_phone")
        .role(format!(
            "Ask the user to confirm their phone number and WAIT for the response. \
             Only call confirm_phone AFTER they have spoken: yes/correct -> \
             action=\"confirm\", wants to change -> action=\"change\". Always say \
             'più' for '+'. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "I have your phone number as: {spelled}. Is this correct? Say 'yes' if \
             it's correct, or 'change' to provide a different number."
        ))
        .function(FunctionSchema::new(
            "confirm_phone",
            "Confirm the phone number or request to change it",
            json!({
                "action": {
                    "type": "string",
                    "enum": ["confirm", "change"],
                    "description": "confirm if the phone is correct, change otherwise"
                }
            }),
            &["action"],
        ))
        .build()
}

pub fn create_collect_reminder_authorization_node() -> NodeConfig {
    NodeConfig::named("collect_reminder_authorization")
        .role(format!(
            "Ask if the patient wants SMS reminders for the appointment. Wait for an \
             explicit yes/no before calling the function. {LANGUAGE_CONFIG}"
        ))
        .task(
            "Would you like to receive an SMS reminder for your scheduled \
             appointment? Please say 'yes' or 'no'.",
        )
        .function(FunctionSchema::new(
            "collect_reminder_authorization",
            "Record the reminder preference from the user's explicit response",
            json!({
                "reminder_authorization": {
                    "type": "boolean",
                    "description": "Whether the patient wants appointment reminders"
                }
            }),
            &["reminder_authorization"],
        ))
        .build()
}

pub fn create_collect_marketing_authorization_node() -> NodeConfig {
    NodeConfig::named("collect_marketing_authorization")
        .role(format!(
            "Ask if the patient wants marketing updates from Cerba HealthCare. Wait \
             for an explicit yes/no before calling the function. {LANGUAGE_CONFIG}"
        ))
        .task(
            "Would you like to receive updates about Cerba HealthCare? Please say \
             'yes' or 'no'.",
        )
        .function(FunctionSchema::new(
            "collect_marketing_authorization",
            "Record the marketing preference from the user's explicit response",
            json!({
                "marketing_authorization": {
                    "type": "boolean",
                    "description": "Whether the patient wants marketing updates"
                }
            }),
            &["marketing_authorization"],
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::ContextStrategy;

    #[test]
    fn first_name_node_resets_context() {
        let node = create_collect_first_name_node();
        assert_eq!(node.context_strategy, ContextStrategy::Reset);
    }

    #[test]
    fn confirm_phone_spells_the_digits() {
        let node = create_confirm_phone_node("333");
        assert!(node.task_messages[0].contains("3 3 3"));
    }

    #[test]
    fn authorization_nodes_expect_booleans() {
        let node = create_collect_reminder_authorization_node();
        assert_eq!(
            node.functions[0].properties["reminder_authorization"]["type"],
            "boolean"
        );
    }
}

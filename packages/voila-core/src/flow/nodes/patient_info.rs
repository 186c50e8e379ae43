//! Patient information collection nodes: address, gender, date of birth,
//! and the recap verification.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;

pub fn create_collect_address_node() -> NodeConfig {
    NodeConfig::named("collect_address")
        .role(format!(
            "Collect the patient's address to find nearby health centers. {LANGUAGE_CONFIG}"
        ))
        .task(
            "Perfect! Now I need your address or city to find nearby health centers. \
             Please tell me your address.",
        )
        .function(FunctionSchema::new(
            "collect_address",
            "Collect the patient's address",
            json!({
                "address": {
                    "type": "string",
                    "description": "Patient's address or city"
                }
            }),
            &["address"],
        ))
        .build()
}

pub fn create_collect_gender_node() -> NodeConfig {
    NodeConfig::named("collect_gender")
        .role(format!(
            "Ask the patient's gender. When the user answers, call collect_gender. \
             'termina/termine' means 'femmina' (transcription error). {LANGUAGE_CONFIG}"
        ))
        .task("Please tell me your gender. Are you male or female?")
        .function(FunctionSchema::new(
            "collect_gender",
            "Collect patient's gender",
            json!({
                "gender": {
                    "type": "string",
                    "description": "Patient's gender (male/female)"
                }
            }),
            &["gender"],
        ))
        .build()
}

pub fn create_collect_dob_node() -> NodeConfig {
    NodeConfig::named("collect_dob")
        .role(format!(
            "Collect the patient's date of birth. Be flexible with formats and \
             convert any natural language date to YYYY-MM-DD internally; never tell \
             the user about format requirements. {LANGUAGE_CONFIG}"
        ))
        .task("Could you give me your date of birth?")
        .function(FunctionSchema::new(
            "collect_dob",
            "Collect the patient's date of birth",
            json!({
                "date_of_birth": {
                    "type": "string",
                    "description": "Date of birth in YYYY-MM-DD format"
                }
            }),
            &["date_of_birth"],
        ))
        .build()
}

/// Recaps address, gender, and DOB in one natural sentence and lets the
/// caller confirm or change a single field.
pub fn create_verify_basic_info_node(address: &str, gender: &str, dob: &str) -> NodeConfig {
    let gender_italian = match gender {
        "m" => "maschio",
        "f" => "femmina",
        other => other,
    };

    NodeConfig::named("verify_basic_info")
        .role(format!(
            "Present the patient info for verification in ONE natural flowing \
             sentence - never bullet points or 'field: value' pairs, they sound \
             robotic when spoken. When the user responds call verify_basic_info: \
             confirmation -> action=\"confirm\", a change -> action=\"change\" plus \
             field_to_change and new_value. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "Say: 'Ricapitoliamo le informazioni che mi hai fornito. Il sesso che \
             hai indicato è {gender_italian}, la data di nascita è {dob}, e \
             l'indirizzo è {address}. È tutto corretto? Dimmi di sì oppure cosa \
             devo modificare.'"
        ))
        .function(FunctionSchema::new(
            "verify_basic_info",
            "Handle verification response - confirm all details or update one field",
            json!({
                "action": {
                    "type": "string",
                    "enum": ["confirm", "change"],
                    "description": "confirm if the user says yes, change otherwise"
                },
                "field_to_change": {
                    "type": "string",
                    "enum": ["address", "gender", "date_of_birth"],
                    "description": "Which field to change (only with action=change)"
                },
                "new_value": {
                    "type": "string",
                    "description": "New value for the field (only with action=change)"
                }
            }),
            &["action"],
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_node_speaks_gender_in_italian() {
        let node = create_verify_basic_info_node("Milano", "m", "1989-04-29");
        assert!(node.task_messages[0].contains("maschio"));
        assert!(node.task_messages[0].contains("Milano"));
    }

    #[test]
    fn collection_chain_exposes_one_tool_each() {
        for (node, tool) in [
            (create_collect_address_node(), "collect_address"),
            (create_collect_gender_node(), "collect_gender"),
            (create_collect_dob_node(), "collect_dob"),
        ] {
            assert_eq!(node.functions.len(), 1);
            assert!(node.has_function(tool));
        }
    }
}

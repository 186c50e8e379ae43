//! Nodes for patients found in the directory: phone verification is the
//! only detail still collected.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;

/// Summary for a known patient: confirm the phone or change it.
pub fn create_patient_summary_node(first_name: &str, last_name: &str) -> NodeConfig {
    NodeConfig::named("patient_summary")
        .role(format!(
            "The patient was found in the Cerba Healthcare database as {first_name} \
             {last_name}; no personal details need collecting again. Tell them the \
             booking confirmation will be sent by SMS to the number they are calling \
             from, and ask whether to proceed or change the number. On the answer \
             call handle_patient_summary: proceed -> action=\"confirm_phone\", \
             change -> action=\"change_phone\". {LANGUAGE_CONFIG}"
        ))
        .task(
            "Say: 'Perfetto! Ho trovato i tuoi dati nel nostro sistema. Invieremo la \
             conferma via SMS al numero da cui stai chiamando. Procediamo, o vuoi \
             cambiare numero?'",
        )
        .function(FunctionSchema::new(
            "handle_patient_summary",
            "Handle the known-patient confirmation response",
            json!({
                "action": {
                    "type": "string",
                    "enum": ["confirm_phone", "change_phone"],
                    "description": "confirm_phone to proceed, change_phone to update the number"
                }
            }),
            &["action"],
        ))
        .build()
}

/// Collects a replacement phone number for a known patient.
pub fn create_phone_edit_node() -> NodeConfig {
    NodeConfig::named("phone_edit")
        .role(format!(
            "Collect the replacement phone number digit by digit, slowly. \
             {LANGUAGE_CONFIG}"
        ))
        .task("Tell me the phone number to use, digit by digit. Slowly!")
        .function(FunctionSchema::new(
            "edit_phone",
            "Record the replacement phone number",
            json!({
                "phone": {
                    "type": "string",
                    "description": "The new phone number digits"
                }
            }),
            &["phone"],
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_the_patient_name() {
        let node = create_patient_summary_node("Mario", "Rossi");
        assert!(node.role_messages[0].contains("Mario Rossi"));
        assert!(node.has_function("handle_patient_summary"));
    }
}

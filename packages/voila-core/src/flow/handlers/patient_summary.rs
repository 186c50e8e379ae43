//! Handlers for patients already present in the directory: only the phone
//! number remains to verify or edit.

use serde_json::{json, Value};

use crate::flow::handlers::{arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::patient_details::create_collect_reminder_authorization_node;
use crate::flow::nodes::patient_summary::{create_patient_summary_node, create_phone_edit_node};
use crate::flow::{FlowContext, HandlerResult};
use crate::services::patient::normalize_phone;
use crate::utils::digits_only;

/// `handle_patient_summary`: proceed with the caller's number or edit it.
pub async fn handle_patient_summary(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let action = arg_str(&args, "action");
    let patient_id = ctx.state.patient_db_id.clone().unwrap_or_default();

    match action.as_str() {
        "confirm_phone" => {
            // The confirmation goes to the number the patient is calling
            // from; fall back to the directory record if caller ID is gone.
            if let Some(caller) = ctx.state.caller_phone_from_peer.clone() {
                ctx.state.patient_phone = Some(digits_only(&caller));
            }
            log::info!(
                "[Flow] Patient {} confirmed phone, proceeding to authorizations",
                patient_id
            );
            Ok((
                json!({"success": true, "message": "Phone number confirmed"}),
                Transition::to(create_collect_reminder_authorization_node()),
            ))
        }
        "change_phone" => {
            log::info!("[Flow] Patient {} wants to change phone number", patient_id);
            Ok((
                json!({"success": true, "message": "Let's update your phone number"}),
                Transition::to(create_phone_edit_node()),
            ))
        }
        other => {
            log::warn!("[Flow] Invalid summary action '{}' from patient {}", other, patient_id);
            let first = ctx.state.patient_first_name.clone().unwrap_or_default();
            let last = ctx.state.patient_surname.clone().unwrap_or_default();
            Ok((
                json!({
                    "success": false,
                    "message": "Please say 'correct' to confirm the phone number or \
                                'change phone' to update it.",
                }),
                Transition::to(create_patient_summary_node(&first, &last)),
            ))
        }
    }
}

/// `edit_phone`: record a replacement number, then re-present the summary.
pub async fn edit_phone(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let phone = arg_str(&args, "phone");
    if phone.is_empty() {
        return Ok(failure("Please provide your phone number"));
    }

    let Some(normalized) = normalize_phone(&phone) else {
        return Ok(failure("Please provide a valid phone number"));
    };

    ctx.state.patient_phone = Some(digits_only(&normalized));
    log::info!("[Flow] Phone updated for known patient");

    let first = ctx.state.patient_first_name.clone().unwrap_or_default();
    let last = ctx.state.patient_surname.clone().unwrap_or_default();

    Ok((
        json!({"success": true, "message": "Phone number updated. Please verify again."}),
        Transition::to(create_patient_summary_node(&first, &last)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::test_context;

    fn node_name(transition: &Transition) -> &'static str {
        match transition {
            Transition::TransitionTo(node) => node.name,
            Transition::StayOnNode => "(stay)",
        }
    }

    #[tokio::test]
    async fn confirm_adopts_caller_phone_and_moves_on() {
        let mut harness = test_context(vec![]);
        harness.state.patient_db_id = Some("p-1".into());
        let mut ctx = harness.context();

        let (_, t) = handle_patient_summary(json!({"action": "confirm_phone"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(node_name(&t), "collect_reminder_authorization");
        assert_eq!(ctx.state.patient_phone.as_deref(), Some("393331234567"));
    }

    #[tokio::test]
    async fn edit_phone_returns_to_summary() {
        let mut harness = test_context(vec![]);
        harness.state.patient_first_name = Some("Mario".into());
        harness.state.patient_surname = Some("Rossi".into());
        let mut ctx = harness.context();

        let (_, t) = edit_phone(json!({"phone": "333 765 4321"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "patient_summary");
        assert_eq!(ctx.state.patient_phone.as_deref(), Some("393337654321"));
    }

    #[tokio::test]
    async fn invalid_action_re_presents_the_summary() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (result, t) = handle_patient_summary(json!({"action": "boh"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "patient_summary");
    }
}

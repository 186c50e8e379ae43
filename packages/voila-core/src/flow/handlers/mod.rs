//! Tool-call handlers.
//!
//! One static dispatch table maps tool names to handlers; every handler is
//! `(args, FlowContext) -> (result, Transition)` with side effects confined
//! to the flow state and the injected services.

pub mod booking;
pub mod patient_details;
pub mod patient_info;
pub mod patient_summary;
pub mod pricing;
pub mod second_service;
pub mod service;

use serde_json::Value;

use crate::error::BridgeError;
use crate::flow::{global, FlowContext, HandlerResult};

/// Dispatches a tool call by name.
pub async fn dispatch(name: &str, args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    match name {
        // Service search and selection
        "search_health_services" | "start_new_booking" => {
            service::search_health_services(args, ctx).await
        }
        "select_service" => service::select_service(args, ctx).await,
        "refine_search" => service::refine_search(args, ctx).await,

        // Patient info
        "collect_address" => patient_info::collect_address(args, ctx).await,
        "collect_gender" => patient_info::collect_gender(args, ctx).await,
        "collect_dob" => patient_info::collect_dob(args, ctx).await,
        "verify_basic_info" => patient_info::verify_basic_info(args, ctx).await,

        // Booking path
        "perform_center_search" => booking::perform_center_search(args, ctx).await,
        "select_center" => booking::select_center(args, ctx).await,
        "perform_sorting" => booking::perform_sorting(args, ctx).await,
        "collect_cerba_membership" => booking::collect_cerba_membership(args, ctx).await,
        "collect_datetime" => booking::collect_datetime(args, ctx).await,
        "select_slot" => booking::select_slot(args, ctx).await,

        // Patient details and commit
        "collect_first_name" => patient_details::collect_first_name(args, ctx).await,
        "collect_surname" => patient_details::collect_surname(args, ctx).await,
        "collect_phone" => patient_details::collect_phone(args, ctx).await,
        "confirm_phone" => patient_details::confirm_phone(args, ctx).await,
        "collect_reminder_authorization" => {
            patient_details::collect_reminder_authorization(args, ctx).await
        }
        "collect_marketing_authorization" => {
            patient_details::collect_marketing_authorization(args, ctx).await
        }
        "confirm_details_and_create_booking" => {
            patient_details::confirm_details_and_create_booking(args, ctx).await
        }

        // Known-patient summary
        "handle_patient_summary" => patient_summary::handle_patient_summary(args, ctx).await,
        "edit_phone" => patient_summary::edit_phone(args, ctx).await,

        // Second service
        "perform_second_service_search" => {
            second_service::perform_second_service_search(args, ctx).await
        }
        "select_second_service" => second_service::select_second_service(args, ctx).await,
        "refine_second_service_search" => {
            second_service::refine_second_service_search(args, ctx).await
        }
        "perform_second_service_sorting" => {
            second_service::perform_second_service_sorting(args, ctx).await
        }

        // Price inquiry
        "proceed_to_booking" => pricing::proceed_to_booking(args, ctx).await,
        "end_price_inquiry" => pricing::end_price_inquiry(args, ctx).await,

        // Global functions, available at every node
        "knowledge_base_new" => global::knowledge_base_new(args, ctx).await,
        "get_competitive_pricing" => global::get_competitive_pricing(args, ctx).await,
        "get_price_non_agonistic_visit" => {
            global::get_price_non_agonistic_visit(args, ctx).await
        }
        "get_exam_by_visit" => global::get_exam_by_visit(args, ctx).await,
        "get_exam_by_sport" => global::get_exam_by_sport(args, ctx).await,
        "call_graph" => global::call_graph(args, ctx).await,
        "request_transfer" => global::request_transfer(args, ctx).await,
        "start_booking" => global::start_booking(args, ctx).await,
        "cancel_previous_appointment" => global::cancel_previous_appointment(args, ctx).await,
        "cancel_and_restart" => global::cancel_and_restart(args, ctx).await,

        other => Err(BridgeError::Validation(format!("unknown tool: {}", other))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Reads a trimmed string argument; absent fields read as empty.
pub(crate) fn arg_str(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Reads a boolean argument; absent fields read as false.
pub(crate) fn arg_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Standard failure payload, keeping the current node.
pub(crate) fn failure(message: &str) -> crate::flow::HandlerOutcome {
    (
        serde_json::json!({"success": false, "message": message}),
        crate::flow::node::Transition::StayOnNode,
    )
}

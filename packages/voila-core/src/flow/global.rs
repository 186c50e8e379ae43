//! Global functions: the fixed tool set attached at every node.
//!
//! These may fire on any turn - info lookups, operator transfer, booking
//! start, and cancellation. An info tool with no answer is a knowledge gap
//! and converts into a transfer offer (or a refusal when the call center is
//! closed).

use serde_json::{json, Value};

use crate::bridge::protocol::transfers_blocked;
use crate::flow::handlers::service::run_search_and_route;
use crate::flow::handlers::{arg_str, failure};
use crate::flow::node::{FunctionSchema, Transition};
use crate::flow::nodes::router::create_router_node;
use crate::flow::nodes::transfer::{create_transfer_node, TransferReason};
use crate::flow::state::{FailureKind, Intent};
use crate::flow::{FlowContext, HandlerResult};

/// Refusal spoken when a transfer is requested outside opening hours.
const CLOSED_REFUSAL: &str =
    "Mi dispiace, il call center è attualmente chiuso. Non posso trasferirla a un \
     operatore in questo momento.";

/// Schemas of the global tool set.
pub fn global_functions() -> Vec<FunctionSchema> {
    vec![
        FunctionSchema::new(
            "knowledge_base_new",
            "Answer FAQs: preparations, documents, booking process questions",
            json!({
                "query": {"type": "string", "description": "The patient's question"}
            }),
            &["query"],
        ),
        FunctionSchema::new(
            "get_competitive_pricing",
            "Agonistic sports visit pricing (needs age, gender, sport, region)",
            json!({
                "age": {"type": "integer", "description": "Patient age in years"},
                "gender": {"type": "string", "description": "M or F"},
                "sport": {"type": "string", "description": "Sport practiced"},
                "region": {"type": "string", "description": "Italian region"}
            }),
            &["age", "gender", "sport", "region"],
        ),
        FunctionSchema::new(
            "get_price_non_agonistic_visit",
            "Non-agonistic sports visit pricing",
            json!({}),
            &[],
        ),
        FunctionSchema::new(
            "get_exam_by_visit",
            "Exams required for a visit type code (A1, A2, A3, B1-B5)",
            json!({
                "visit_type": {"type": "string", "description": "Visit type code"}
            }),
            &["visit_type"],
        ),
        FunctionSchema::new(
            "get_exam_by_sport",
            "Exams required for a specific sport",
            json!({
                "sport": {"type": "string", "description": "Sport practiced"}
            }),
            &["sport"],
        ),
        FunctionSchema::new(
            "call_graph",
            "Clinic hours, closures, doctors, blood collection times",
            json!({
                "query": {"type": "string", "description": "The clinic question"}
            }),
            &["query"],
        ),
        FunctionSchema::new(
            "request_transfer",
            "Transfer to a human operator (when the patient asks or info is not found)",
            json!({
                "immediate": {
                    "type": "boolean",
                    "description": "true when the agent cannot help at all (sports medicine, lab)"
                }
            }),
            &[],
        ),
        FunctionSchema::new(
            "start_booking",
            "Start the appointment booking flow",
            json!({
                "service_request": {
                    "type": "string",
                    "description": "The service the patient wants to book"
                },
                "additional_service_request": {
                    "type": "string",
                    "description": "Second service when the patient asked for two in one call"
                },
                "intent": {
                    "type": "string",
                    "enum": ["booking", "price_inquiry"],
                    "description": "price_inquiry when the patient only wants the price"
                }
            }),
            &["service_request"],
        ),
        FunctionSchema::new(
            "cancel_previous_appointment",
            "Transfer to an operator to cancel or reschedule a PREVIOUSLY booked appointment",
            json!({}),
            &[],
        ),
        FunctionSchema::new(
            "cancel_and_restart",
            "Cancel the current booking in progress and return to the main menu",
            json!({}),
            &[],
        ),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Info tools
// ─────────────────────────────────────────────────────────────────────────────

/// Shared tail of every info tool: answer, or treat as a knowledge gap.
fn answer_or_gap(ctx: &mut FlowContext<'_>, answer: Option<String>) -> HandlerResult {
    if let Some(answer) = answer {
        return Ok((
            json!({"success": true, "answer": answer}),
            Transition::StayOnNode,
        ));
    }

    let should_transfer = ctx.state.failures.record(FailureKind::KnowledgeGap);
    if transfers_blocked(&ctx.state.business_status) {
        return Ok((
            json!({"success": false, "message": CLOSED_REFUSAL}),
            Transition::StayOnNode,
        ));
    }
    if should_transfer {
        return Ok((
            json!({"success": false, "message": "Information not found, transferring"}),
            Transition::to(create_transfer_node(TransferReason::KnowledgeGap)),
        ));
    }
    Ok(failure("Information not found"))
}

pub async fn knowledge_base_new(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let query = arg_str(&args, "query");
    log::info!("[Flow] Knowledge base lookup: '{}'", query);
    let answer = ctx.services.info.knowledge_base(&query).await?;
    answer_or_gap(ctx, answer)
}

pub async fn get_competitive_pricing(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let age = args.get("age").and_then(Value::as_u64).unwrap_or(0) as u32;
    let gender = arg_str(&args, "gender");
    let sport = arg_str(&args, "sport");
    let region = arg_str(&args, "region");

    if age == 0 || gender.is_empty() || sport.is_empty() || region.is_empty() {
        return Ok(failure(
            "I need age, gender, sport, and region for the pricing lookup",
        ));
    }

    let answer = ctx
        .services
        .info
        .competitive_pricing(age, &gender, &sport, &region)
        .await?;
    answer_or_gap(ctx, answer)
}

pub async fn get_price_non_agonistic_visit(
    _args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let answer = ctx.services.info.non_agonistic_price().await?;
    answer_or_gap(ctx, answer)
}

pub async fn get_exam_by_visit(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let visit_type = arg_str(&args, "visit_type");
    let answer = ctx.services.info.exams_by_visit(&visit_type).await?;
    answer_or_gap(ctx, answer)
}

pub async fn get_exam_by_sport(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let sport = arg_str(&args, "sport");
    let answer = ctx.services.info.exams_by_sport(&sport).await?;
    answer_or_gap(ctx, answer)
}

pub async fn call_graph(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let query = arg_str(&args, "query");
    let answer = ctx.services.info.clinic_info(&query).await?;
    answer_or_gap(ctx, answer)
}

// ─────────────────────────────────────────────────────────────────────────────
// Transfer, booking start, cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// `request_transfer`: hand off to an operator - refused while the call
/// center is closed, with the informational and booking paths kept open.
pub async fn request_transfer(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    if transfers_blocked(&ctx.state.business_status) {
        log::info!(
            "[Flow] Transfer refused: business status is {}",
            ctx.state.business_status
        );
        return Ok((
            json!({"success": false, "message": CLOSED_REFUSAL}),
            Transition::StayOnNode,
        ));
    }

    ctx.state.failures.record(FailureKind::TransferRequest);
    Ok((
        json!({"success": true, "message": "Transferring to an operator"}),
        Transition::to(create_transfer_node(TransferReason::UserRequest)),
    ))
}

/// `start_booking`: enter the booking flow, optionally with a second
/// service and a price-only intent.
pub async fn start_booking(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let service_request = arg_str(&args, "service_request");
    let additional = arg_str(&args, "additional_service_request");
    let intent = match arg_str(&args, "intent").as_str() {
        "price_inquiry" => Intent::PriceInquiry,
        _ => Intent::Booking,
    };

    log::info!(
        "[Flow] Booking started: '{}' (additional: {:?}, intent: {:?})",
        service_request,
        (!additional.is_empty()).then_some(&additional),
        intent
    );

    ctx.state.intent = Some(intent);
    ctx.state.booking_in_progress = true;
    if !additional.is_empty() {
        ctx.state.second_service_request = Some(additional);
    }

    run_search_and_route(ctx, &service_request, Some(3)).await
}

/// `cancel_previous_appointment`: cancellations need an operator.
pub async fn cancel_previous_appointment(
    _args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    if transfers_blocked(&ctx.state.business_status) {
        return Ok((
            json!({
                "success": false,
                "message": "Mi dispiace, per disdire o spostare un appuntamento serve un \
                            operatore, ma il call center è chiuso. La invito a richiamare \
                            durante gli orari di apertura.",
            }),
            Transition::StayOnNode,
        ));
    }

    log::info!("[Flow] Cancellation of a previous appointment, transferring");
    Ok((
        json!({"success": true, "message": "Transferring for cancellation"}),
        Transition::to(create_transfer_node(TransferReason::UserRequest)),
    ))
}

/// `cancel_and_restart`: drop the current booking and return to the menu.
pub async fn cancel_and_restart(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    log::info!("[Flow] Cancelling current booking and restarting");
    ctx.state.reset_booking();

    let business_status = ctx.state.business_status.clone();
    Ok((
        json!({"success": true, "message": "Booking cancelled"}),
        Transition::to(create_router_node(true, &business_status)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::{test_context, test_context_with};
    use crate::services::info::StaticInfoBackend;
    use crate::services::mock::MockDirectory;
    use crate::services::types::{HealthService, Sector};

    fn node_name(transition: &Transition) -> &'static str {
        match transition {
            Transition::TransitionTo(node) => node.name,
            Transition::StayOnNode => "(stay)",
        }
    }

    #[tokio::test]
    async fn knowledge_answer_stays_on_node() {
        let mut harness = test_context_with(
            vec![],
            MockDirectory::default(),
            StaticInfoBackend {
                knowledge_answer: Some("Serve il digiuno di 8 ore.".into()),
                ..StaticInfoBackend::default()
            },
        );
        let mut ctx = harness.context();

        let (result, t) = knowledge_base_new(json!({"query": "preparazione"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(node_name(&t), "(stay)");
    }

    #[tokio::test]
    async fn knowledge_gap_transfers_when_open() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (_, t) = knowledge_base_new(json!({"query": "boh"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "transfer");
    }

    #[tokio::test]
    async fn knowledge_gap_refuses_transfer_when_closed() {
        let mut harness = test_context(vec![]);
        harness.state.business_status = "close".into();
        let mut ctx = harness.context();

        let (result, t) = knowledge_base_new(json!({"query": "boh"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "(stay)");
        assert!(result["message"].as_str().unwrap().contains("chiuso"));
    }

    #[tokio::test]
    async fn transfer_request_is_refused_after_hours() {
        let mut harness = test_context(vec![]);
        harness.state.business_status = "after_hours".into();
        let mut ctx = harness.context();

        let (result, t) = request_transfer(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "(stay)");
    }

    #[tokio::test]
    async fn transfer_request_succeeds_when_open() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (_, t) = request_transfer(json!({"immediate": true}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "transfer");
    }

    #[tokio::test]
    async fn start_booking_stores_the_second_service() {
        let mut harness = test_context(vec![HealthService {
            uuid: "u1".into(),
            name: "RX Caviglia Destra".into(),
            code: "RRAD0019".into(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }]);
        let mut ctx = harness.context();

        let (_, _) = start_booking(
            json!({
                "service_request": "RX Caviglia Destra",
                "additional_service_request": "RX Avampiede Destro",
            }),
            &mut ctx,
        )
        .await
        .unwrap();

        assert!(ctx.state.booking_in_progress);
        assert_eq!(
            ctx.state.second_service_request.as_deref(),
            Some("RX Avampiede Destro")
        );
    }

    #[tokio::test]
    async fn cancel_and_restart_resets_and_returns_to_router() {
        let mut harness = test_context(vec![]);
        harness.state.booking_in_progress = true;
        let mut ctx = harness.context();

        let (_, t) = cancel_and_restart(json!({}), &mut ctx).await.unwrap();
        match t {
            Transition::TransitionTo(node) => {
                assert_eq!(node.name, "router");
                assert!(node.task_messages[0].contains("annullata"));
            }
            other => panic!("expected router, got {:?}", other),
        }
        assert!(!ctx.state.booking_in_progress);
    }

    #[test]
    fn the_global_tool_set_is_complete() {
        let names: Vec<&str> = global_functions().iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "knowledge_base_new",
                "get_competitive_pricing",
                "get_price_non_agonistic_visit",
                "get_exam_by_visit",
                "get_exam_by_sport",
                "call_graph",
                "request_transfer",
                "start_booking",
                "cancel_previous_appointment",
                "cancel_and_restart",
            ]
        );
    }
}

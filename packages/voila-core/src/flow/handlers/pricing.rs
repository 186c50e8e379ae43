//! Price inquiry handlers.
//!
//! A price inquiry runs the same collection path as a booking up to the
//! center choice. From the price summary the caller either converts to a
//! booking - re-entering the datetime step with all patient data intact -
//! or ends the inquiry.

use serde_json::{json, Value};

use crate::flow::node::Transition;
use crate::flow::nodes::booking::create_collect_datetime_node;
use crate::flow::nodes::router::create_router_node;
use crate::flow::state::Intent;
use crate::flow::{FlowContext, HandlerResult};
use crate::services::types::BookingScenario;

/// `proceed_to_booking`: convert the inquiry into a booking.
pub async fn proceed_to_booking(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    ctx.state.intent = Some(Intent::Booking);
    ctx.state.booking_scenario = BookingScenario::Legacy;
    ctx.state.booking_in_progress = true;

    log::info!("[Flow] Price inquiry converted to booking, collecting datetime");

    let service_name = ctx
        .state
        .selected_services
        .first()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "your appointment".to_string());
    let center_name = ctx
        .state
        .selected_center
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_default();

    Ok((
        json!({"success": true, "message": "Proceeding to booking"}),
        Transition::to(create_collect_datetime_node(&service_name, &center_name)),
    ))
}

/// `end_price_inquiry`: drop the booking context and return to the router.
pub async fn end_price_inquiry(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    ctx.state.booking_in_progress = false;
    ctx.state.intent = None;
    ctx.state.selected_center = None;
    ctx.state.available_slots.clear();
    ctx.state.pending_search_term = None;

    log::info!("[Flow] Price inquiry ended, returning to router");

    let business_status = ctx.state.business_status.clone();
    Ok((
        json!({"success": true, "message": "Price inquiry ended"}),
        Transition::to(create_router_node(false, &business_status)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::test_context;
    use crate::services::types::{HealthCenter, HealthService, Sector};

    #[tokio::test]
    async fn proceeding_reenters_datetime_with_patient_data_intact() {
        let mut harness = test_context(vec![]);
        harness.state.intent = Some(Intent::PriceInquiry);
        harness.state.patient_address = Some("Milano".into());
        harness.state.patient_gender = Some("m".into());
        harness.state.patient_dob = Some("1989-04-29".into());
        harness.state.select_service(HealthService {
            uuid: "s1".into(),
            name: "RX Caviglia Destra".into(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        });
        harness.state.selected_center = Some(HealthCenter {
            uuid: "c1".into(),
            name: "Delta Medica".into(),
            address: String::new(),
            city: String::new(),
            district: String::new(),
            phone: String::new(),
            region: String::new(),
        });
        let mut ctx = harness.context();

        let (_, t) = proceed_to_booking(json!({}), &mut ctx).await.unwrap();

        match t {
            Transition::TransitionTo(node) => assert_eq!(node.name, "collect_datetime"),
            other => panic!("expected datetime node, got {:?}", other),
        }
        // Intent switched, patient data untouched.
        assert_eq!(ctx.state.intent, Some(Intent::Booking));
        assert_eq!(ctx.state.booking_scenario, BookingScenario::Legacy);
        assert_eq!(ctx.state.patient_dob.as_deref(), Some("1989-04-29"));
        assert_eq!(ctx.state.patient_address.as_deref(), Some("Milano"));
    }

    #[tokio::test]
    async fn ending_clears_the_inquiry_and_returns_to_router() {
        let mut harness = test_context(vec![]);
        harness.state.intent = Some(Intent::PriceInquiry);
        let mut ctx = harness.context();

        let (_, t) = end_price_inquiry(json!({}), &mut ctx).await.unwrap();
        match t {
            Transition::TransitionTo(node) => assert_eq!(node.name, "router"),
            other => panic!("expected router, got {:?}", other),
        }
        assert!(ctx.state.intent.is_none());
    }
}

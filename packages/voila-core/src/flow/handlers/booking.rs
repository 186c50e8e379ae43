//! Booking path handlers: center search and selection, service sorting,
//! membership, preferred date/time, and slot reservation.

use serde_json::{json, Value};

use chrono::NaiveDate;

use crate::flow::handlers::{arg_bool, arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::booking::{
    create_cerba_membership_node, create_center_selection_node, create_collect_datetime_node,
    create_slot_selection_node, create_sorting_node,
};
use crate::flow::nodes::patient_details::create_collect_first_name_node;
use crate::flow::nodes::patient_info::create_collect_address_node;
use crate::flow::nodes::patient_summary::create_patient_summary_node;
use crate::flow::nodes::pricing::create_price_summary_node;
use crate::flow::nodes::second_service::create_second_service_search_node;
use crate::flow::state::{FlowState, Intent};
use crate::flow::{FlowContext, HandlerResult};
use crate::services::booking::{reserve_group_slot, run_sorting, search_group_slots};
use crate::services::directory::HealthCenterQuery;
use crate::services::patient::lookup_by_phone_and_dob;
use crate::services::scenario::interpret_sorting;
use crate::services::types::{BookingScenario, ServiceGroup};

/// The appointment group currently being scheduled: the sorting group under
/// a grouped scenario, otherwise all selected services as one unit.
fn scheduling_group(state: &FlowState) -> ServiceGroup {
    if state.booking_scenario.is_grouped() {
        if let Some(group) = state.current_group() {
            return group.clone();
        }
    }
    ServiceGroup {
        services: state.selected_services.clone(),
        is_group: false,
    }
}

fn group_display_name(group: &ServiceGroup) -> String {
    group
        .services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" più ")
}

/// `perform_center_search`: silent lookup of centers near the address.
pub async fn perform_center_search(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let address = ctx.state.patient_address.clone().unwrap_or_default();
    let gender = ctx.state.patient_gender.clone().unwrap_or_default();
    let dob = ctx.state.dob_compact();

    if ctx.state.selected_services.is_empty() || address.is_empty() {
        return Ok((
            json!({"success": false, "message": "Missing service or address"}),
            Transition::to(create_collect_address_node()),
        ));
    }

    let query = HealthCenterQuery {
        health_services: ctx
            .state
            .selected_services
            .iter()
            .map(|s| s.uuid.clone())
            .collect(),
        gender,
        date_of_birth: dob,
        address: address.clone(),
        health_services_availability: true,
    };

    let centers = ctx.services.directory.search_health_centers(&query).await?;
    if centers.is_empty() {
        log::warn!("[Flow] No centers found near '{}'", address);
        return Ok((
            json!({
                "success": false,
                "message": format!("No centers found near {}. Please tell me another address.", address),
            }),
            Transition::to(create_collect_address_node()),
        ));
    }

    ctx.state.centers_found = centers.clone();

    Ok((
        json!({
            "success": true,
            "count": centers.len(),
            "centers": centers.iter().take(3).map(|c| json!({
                "name": c.name, "uuid": c.uuid, "city": c.city,
            })).collect::<Vec<_>>(),
        }),
        Transition::to(create_center_selection_node(&centers)),
    ))
}

/// `select_center`: adopt a center; price inquiries branch off here.
pub async fn select_center(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let center_uuid = arg_str(&args, "center_uuid");
    if center_uuid.is_empty() {
        return Ok(failure("Please select a health center"));
    }

    let Some(center) = ctx
        .state
        .centers_found
        .iter()
        .find(|c| c.uuid == center_uuid)
        .cloned()
    else {
        return Ok(failure("Health center not found"));
    };

    log::info!("[Flow] Center selected: {}", center.name);
    ctx.state.selected_center = Some(center.clone());

    if ctx.state.intent == Some(Intent::PriceInquiry) {
        let service_name = ctx
            .state
            .selected_services
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        return Ok((
            json!({"success": true, "center_name": center.name, "price_inquiry": true}),
            Transition::to(create_price_summary_node(&service_name, &center.name, None)),
        ));
    }

    let display = group_display_name(&scheduling_group(ctx.state));
    Ok((
        json!({"success": true, "center_name": center.name}),
        Transition::to(create_sorting_node(&display)),
    ))
}

/// `perform_sorting`: group the selected services into appointments.
///
/// A sorting failure for the primary booking degrades to the legacy 1:1
/// mapping rather than aborting the flow.
pub async fn perform_sorting(_args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let Some(center) = ctx.state.selected_center.clone() else {
        return Ok(failure("No health center selected"));
    };
    let gender = ctx.state.patient_gender.clone().unwrap_or_else(|| "m".into());
    let dob = ctx.state.dob_compact();

    match run_sorting(
        &ctx.services.directory,
        &center.uuid,
        &gender,
        &dob,
        &ctx.state.selected_services,
    )
    .await
    {
        Ok(groups) => {
            let interpretation = interpret_sorting(&groups);
            ctx.state.service_groups = groups;
            ctx.state.booking_scenario = interpretation.scenario;
            ctx.state.scenario_reasoning = Some(interpretation.reasoning);
            ctx.state.current_group_index = 0;

            Ok((
                json!({
                    "success": true,
                    "booking_scenario": interpretation.scenario.as_str(),
                    "num_appointments": interpretation.num_appointments,
                    "service_summary": interpretation.service_summary,
                }),
                Transition::to(create_cerba_membership_node()),
            ))
        }
        Err(e) => {
            log::warn!("[Flow] Sorting failed, using legacy slot mapping: {}", e);
            ctx.state.service_groups.clear();
            ctx.state.booking_scenario = BookingScenario::Legacy;
            ctx.state.current_group_index = 0;

            Ok((
                json!({"success": true, "booking_scenario": "legacy"}),
                Transition::to(create_cerba_membership_node()),
            ))
        }
    }
}

/// `collect_cerba_membership` -> preferred date/time.
pub async fn collect_cerba_membership(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let is_member = arg_bool(&args, "is_member");
    ctx.state.is_cerba_member = is_member;
    log::info!("[Flow] Cerba membership: {}", is_member);

    let group = scheduling_group(ctx.state);
    let center_name = ctx
        .state
        .selected_center
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_default();

    Ok((
        json!({"success": true, "is_cerba_member": is_member}),
        Transition::to(create_collect_datetime_node(
            &group_display_name(&group),
            &center_name,
        )),
    ))
}

/// `collect_datetime`: search open slots around the preferred date.
pub async fn collect_datetime(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let preferred_date = arg_str(&args, "preferred_date");
    let preferred_time = arg_str(&args, "preferred_time");

    if NaiveDate::parse_from_str(&preferred_date, "%Y-%m-%d").is_err() {
        return Ok(failure("Please tell me the preferred date again"));
    }

    ctx.state.preferred_date = Some(preferred_date.clone());
    ctx.state.preferred_time =
        (!preferred_time.is_empty()).then(|| preferred_time.clone());

    let Some(center) = ctx.state.selected_center.clone() else {
        return Ok(failure("No health center selected"));
    };
    let group = scheduling_group(ctx.state);

    let slots = search_group_slots(
        &ctx.services.directory,
        &center.uuid,
        &group,
        &preferred_date,
        &preferred_time,
    )
    .await?;

    if slots.is_empty() {
        return Ok(failure(&format!(
            "No availability around {}. Please tell me another day.",
            preferred_date
        )));
    }

    ctx.state.available_slots = slots.clone();

    Ok((
        json!({
            "success": true,
            "count": slots.len(),
            "slots": slots.iter().take(3).map(|s| json!({
                "uuid": s.uuid, "start_time": s.start_time,
            })).collect::<Vec<_>>(),
        }),
        Transition::to(create_slot_selection_node(&slots, &group_display_name(&group))),
    ))
}

/// `select_slot`: reserve the chosen slot and route onward - to the next
/// group, to a pending second service, or into patient detail collection.
pub async fn select_slot(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let slot_uuid = arg_str(&args, "slot_uuid");
    let Some(slot) = ctx
        .state
        .available_slots
        .iter()
        .find(|s| s.uuid == slot_uuid)
        .cloned()
    else {
        return Ok(failure("Please choose one of the presented slots"));
    };

    let group = scheduling_group(ctx.state);
    let reservation = reserve_group_slot(&ctx.services.directory, &slot, &group).await?;

    log::info!(
        "[Flow] Slot reserved: {} for {} ({} total)",
        reservation.slot_uuid,
        reservation.service_name,
        ctx.state.booked_slots.len() + 1
    );
    ctx.state.booked_slots.push(reservation.clone());
    ctx.state.available_slots.clear();

    // More groups to schedule under a grouped scenario.
    if ctx.state.booking_scenario.is_grouped()
        && ctx.state.current_group_index + 1 < ctx.state.service_groups.len()
    {
        ctx.state.current_group_index += 1;
        let next_group = scheduling_group(ctx.state);
        let center_name = ctx
            .state
            .selected_center
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default();

        return Ok((
            json!({
                "success": true,
                "slot_uuid": reservation.slot_uuid,
                "next_group": group_display_name(&next_group),
            }),
            Transition::to(create_collect_datetime_node(
                &group_display_name(&next_group),
                &center_name,
            )),
        ));
    }

    // A second service was requested up front; schedule it now.
    if let Some(second) = ctx.state.second_service_request.take() {
        log::info!("[Flow] First service scheduled, moving to second: {}", second);
        ctx.state.pending_search_term = Some(second);
        return Ok((
            json!({"success": true, "slot_uuid": reservation.slot_uuid, "second_service": true}),
            Transition::to(create_second_service_search_node()),
        ));
    }

    // All appointments reserved: look the patient up before collecting
    // details from scratch.
    let caller_phone = ctx.state.caller_phone_from_peer.clone().unwrap_or_default();
    let dob = ctx.state.patient_dob.clone().unwrap_or_default();

    if !caller_phone.is_empty() && !dob.is_empty() {
        if let Some(patient) =
            lookup_by_phone_and_dob(&ctx.services.directory, &caller_phone, &dob).await
        {
            ctx.state.patient_first_name = Some(patient.first_name.clone());
            ctx.state.patient_surname = Some(patient.last_name.clone());
            ctx.state.patient_phone = Some(patient.phone.clone());
            ctx.state.patient_email = Some(patient.email.clone());
            ctx.state.patient_found_in_db = true;
            ctx.state.patient_db_id = Some(patient.id.clone());

            return Ok((
                json!({
                    "success": true,
                    "slot_uuid": reservation.slot_uuid,
                    "patient_found": true,
                }),
                Transition::to(create_patient_summary_node(
                    &patient.first_name,
                    &patient.last_name,
                )),
            ));
        }
    }

    Ok((
        json!({"success": true, "slot_uuid": reservation.slot_uuid, "patient_found": false}),
        Transition::to(create_collect_first_name_node()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::{test_context_with, TestHarness};
    use crate::services::directory::{RawPatient, RawSortedService, RawSortingGroup};
    use crate::services::info::StaticInfoBackend;
    use crate::services::mock::MockDirectory;
    use crate::services::types::{AvailableSlot, HealthCenter, HealthService, Sector};

    fn svc(uuid: &str, name: &str) -> HealthService {
        HealthService {
            uuid: uuid.into(),
            name: name.into(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }
    }

    fn center(uuid: &str, name: &str) -> HealthCenter {
        HealthCenter {
            uuid: uuid.into(),
            name: name.into(),
            address: "Viale Toscana 35/37, Rozzano".into(),
            city: "Rozzano".into(),
            district: "Milano".into(),
            phone: "+39 02 1234567".into(),
            region: "Lombardia".into(),
        }
    }

    fn slot(uuid: &str) -> AvailableSlot {
        AvailableSlot {
            uuid: uuid.into(),
            start_time: "2026-08-10T08:00:00+00:00".into(),
            end_time: "2026-08-10T08:20:00+00:00".into(),
            price: 45.0,
        }
    }

    fn booking_harness(directory: MockDirectory) -> TestHarness {
        let mut harness =
            test_context_with(vec![], directory, StaticInfoBackend::default());
        harness.state.select_service(svc("s1", "RX Caviglia Destra"));
        harness.state.patient_address = Some("Milano".into());
        harness.state.patient_gender = Some("m".into());
        harness.state.patient_dob = Some("1989-04-29".into());
        harness
    }

    fn node_name(transition: &Transition) -> &'static str {
        match transition {
            Transition::TransitionTo(node) => node.name,
            Transition::StayOnNode => "(stay)",
        }
    }

    #[tokio::test]
    async fn center_search_presents_selection() {
        let mut harness = booking_harness(MockDirectory {
            centers: vec![center("c1", "Delta Medica")],
            ..MockDirectory::default()
        });
        let mut ctx = harness.context();

        let (result, t) = perform_center_search(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(node_name(&t), "center_selection");
        assert_eq!(ctx.state.centers_found.len(), 1);
    }

    #[tokio::test]
    async fn empty_center_search_asks_for_another_address() {
        let mut harness = booking_harness(MockDirectory::default());
        let mut ctx = harness.context();

        let (result, t) = perform_center_search(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "collect_address");
    }

    #[tokio::test]
    async fn select_center_routes_booking_to_sorting() {
        let mut harness = booking_harness(MockDirectory::default());
        harness.state.centers_found = vec![center("c1", "Delta Medica")];
        let mut ctx = harness.context();

        let (_, t) = select_center(json!({"center_uuid": "c1"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "service_sorting");
        assert!(ctx.state.selected_center.is_some());
    }

    #[tokio::test]
    async fn select_center_routes_price_inquiry_to_summary() {
        let mut harness = booking_harness(MockDirectory::default());
        harness.state.centers_found = vec![center("c1", "Delta Medica")];
        harness.state.intent = Some(Intent::PriceInquiry);
        let mut ctx = harness.context();

        let (_, t) = select_center(json!({"center_uuid": "c1"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "price_summary");
    }

    #[tokio::test]
    async fn sorting_success_classifies_and_moves_to_membership() {
        let mut harness = booking_harness(MockDirectory {
            sorting_groups: vec![RawSortingGroup {
                health_services: vec![RawSortedService {
                    uuid: Some("s1".into()),
                    name: Some("RX Caviglia Destra".into()),
                    health_service_code: Some("RRAD0019".into()),
                }],
                group: false,
            }],
            ..MockDirectory::default()
        });
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        let mut ctx = harness.context();

        let (result, t) = perform_sorting(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["booking_scenario"], "combined");
        assert_eq!(node_name(&t), "cerba_membership");
        assert_eq!(ctx.state.service_groups.len(), 1);
    }

    #[tokio::test]
    async fn sorting_failure_degrades_to_legacy() {
        let mut harness = booking_harness(MockDirectory {
            sorting_fails: true,
            ..MockDirectory::default()
        });
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        let mut ctx = harness.context();

        let (result, t) = perform_sorting(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["booking_scenario"], "legacy");
        assert_eq!(node_name(&t), "cerba_membership");
        assert_eq!(ctx.state.booking_scenario, BookingScenario::Legacy);
    }

    #[tokio::test]
    async fn datetime_without_availability_stays_on_node() {
        let mut harness = booking_harness(MockDirectory::default());
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        let mut ctx = harness.context();

        let (result, t) =
            collect_datetime(json!({"preferred_date": "2026-08-10"}), &mut ctx)
                .await
                .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "(stay)");
    }

    #[tokio::test]
    async fn slot_selection_reserves_and_collects_details_for_unknown_patient() {
        let mut harness = booking_harness(MockDirectory {
            slots: vec![slot("a1")],
            ..MockDirectory::default()
        });
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        harness.state.available_slots = vec![slot("a1")];
        let mut ctx = harness.context();

        let (result, t) = select_slot(json!({"slot_uuid": "a1"}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["patient_found"], false);
        assert_eq!(node_name(&t), "collect_first_name");
        assert_eq!(ctx.state.booked_slots.len(), 1);
        assert!(ctx.state.available_slots.is_empty());
    }

    #[tokio::test]
    async fn slot_selection_skips_details_for_known_patient() {
        let mut harness = booking_harness(MockDirectory {
            slots: vec![slot("a1")],
            patients: vec![RawPatient {
                uuid: "p-7".into(),
                name: "Mario".into(),
                surname: "Rossi".into(),
                fiscal_code: String::new(),
                date_of_birth: "1989-04-29".into(),
                phone: "+393331234567".into(),
                email: String::new(),
            }],
            ..MockDirectory::default()
        });
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        harness.state.available_slots = vec![slot("a1")];
        let mut ctx = harness.context();

        let (result, t) = select_slot(json!({"slot_uuid": "a1"}), &mut ctx).await.unwrap();
        assert_eq!(result["patient_found"], true);
        assert_eq!(node_name(&t), "patient_summary");
        assert!(ctx.state.patient_found_in_db);
        assert_eq!(ctx.state.patient_db_id.as_deref(), Some("p-7"));
    }

    #[tokio::test]
    async fn grouped_scenario_walks_every_group() {
        let mut harness = booking_harness(MockDirectory {
            slots: vec![slot("a1")],
            ..MockDirectory::default()
        });
        harness.state.selected_center = Some(center("c1", "Delta Medica"));
        harness.state.booking_scenario = BookingScenario::Separate;
        harness.state.service_groups = vec![
            crate::services::types::ServiceGroup {
                services: vec![svc("s1", "RX Caviglia Destra")],
                is_group: false,
            },
            crate::services::types::ServiceGroup {
                services: vec![svc("s2", "Visita Ortopedica")],
                is_group: false,
            },
        ];
        harness.state.available_slots = vec![slot("a1")];
        let mut ctx = harness.context();

        let (result, t) = select_slot(json!({"slot_uuid": "a1"}), &mut ctx).await.unwrap();
        assert_eq!(result["next_group"], "Visita Ortopedica");
        assert_eq!(node_name(&t), "collect_datetime");
        assert_eq!(ctx.state.current_group_index, 1);
    }
}

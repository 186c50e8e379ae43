//! Second-service handlers: search, selection, and sorting for an
//! additional service requested in the same call.

use serde_json::{json, Value};

use crate::flow::handlers::service::find_exact_match;
use crate::flow::handlers::{arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::booking::{create_center_search_node, create_collect_datetime_node};
use crate::flow::nodes::second_service::{
    create_second_service_selection_node, create_second_service_sorting_node,
};
use crate::flow::nodes::service_selection::create_search_retry_node;
use crate::flow::{FlowContext, HandlerResult};
use crate::services::booking::run_sorting;
use crate::services::types::{BookingScenario, HealthService};

/// Adopts the chosen second service and heads to its sorting step.
async fn transition_to_sorting(
    ctx: &mut FlowContext<'_>,
    service: HealthService,
) -> HandlerResult {
    ctx.state.select_service(service.clone());

    let _ = ctx
        .speech
        .speak(&format!(
            "Sto verificando la disponibilità per {}. Attendi un momento.",
            service.name
        ))
        .await;

    Ok((
        json!({
            "success": true,
            "service_name": service.name,
            "message": format!("Proceeding to sort {}", service.name),
        }),
        Transition::to(create_second_service_sorting_node(&service.name)),
    ))
}

/// `perform_second_service_search`: fuzzy search for the pending request.
pub async fn perform_second_service_search(
    _args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let search_term = ctx
        .state
        .pending_search_term
        .clone()
        .or_else(|| ctx.state.second_service_request.clone())
        .unwrap_or_default();

    if search_term.chars().count() < 2 {
        let message = "Please provide the name of a service to search for.";
        return Ok((
            json!({"success": false, "message": message, "services": []}),
            Transition::to(create_search_retry_node(message)),
        ));
    }

    ctx.state.pending_search_term = Some(search_term.clone());
    log::info!("[Flow] Second service search: '{}'", search_term);

    let result = ctx.services.search.search(&search_term, Some(3));

    if result.found && !result.services.is_empty() {
        ctx.state.services_found = result.services.clone();
        ctx.state.current_search_term = Some(search_term.clone());

        if let Some(exact) = find_exact_match(&search_term, &result.services) {
            let exact = exact.clone();
            log::info!("[Flow] Auto-selecting exact second-service match: {}", exact.name);
            return transition_to_sorting(ctx, exact).await;
        }

        Ok((
            json!({
                "success": true,
                "count": result.count,
                "services": result.services.iter().map(|s| json!({
                    "name": s.name, "uuid": s.uuid,
                })).collect::<Vec<_>>(),
                "search_term": search_term,
            }),
            Transition::to(create_second_service_selection_node(
                &result.services,
                &search_term,
            )),
        ))
    } else {
        let message = result.message.unwrap_or_else(|| {
            format!(
                "No services found for '{}'. Can you please provide the full service name.",
                search_term
            )
        });
        Ok((
            json!({"success": false, "message": message, "services": []}),
            Transition::to(create_search_retry_node(&message)),
        ))
    }
}

/// `select_second_service`: user picked one of the candidates.
pub async fn select_second_service(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let service_uuid = arg_str(&args, "service_uuid");
    if service_uuid.is_empty() {
        return Ok(failure("Please select a service"));
    }

    let Some(service) = ctx
        .state
        .services_found
        .iter()
        .find(|s| s.uuid == service_uuid)
        .cloned()
    else {
        return Ok(failure("Service not found"));
    };

    log::info!("[Flow] Second service selected: {}", service.name);
    transition_to_sorting(ctx, service).await
}

/// `refine_second_service_search`: retry with a more specific name.
pub async fn refine_second_service_search(
    args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let refined = arg_str(&args, "refined_search_term");
    if refined.chars().count() < 3 {
        return Ok(failure("Please provide a more specific service name"));
    }

    ctx.state.pending_search_term = Some(refined);
    perform_second_service_search(json!({}), ctx).await
}

/// `perform_second_service_sorting`: sort the second service at the center
/// already chosen; when the center cannot provide it, fall back to a fresh
/// center search.
pub async fn perform_second_service_sorting(
    _args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let Some(center) = ctx.state.selected_center.clone() else {
        return Ok((
            json!({"success": false, "message": "Missing center or service"}),
            Transition::to(create_center_search_node()),
        ));
    };
    let Some(second) = ctx.state.selected_services.last().cloned() else {
        return Ok(failure("Missing second service"));
    };

    let gender = ctx.state.patient_gender.clone().unwrap_or_else(|| "m".into());
    let dob = ctx.state.dob_compact();

    log::info!(
        "[Flow] Second service sorting: {} at {}",
        second.name,
        center.name
    );

    match run_sorting(
        &ctx.services.directory,
        &center.uuid,
        &gender,
        &dob,
        std::slice::from_ref(&second),
    )
    .await
    {
        Ok(mut groups) => {
            // Append to the existing plan; every group still maps to one
            // reservation, so the commit mapping stays aligned.
            let next_index = ctx.state.service_groups.len();
            ctx.state.service_groups.append(&mut groups);
            ctx.state.booking_scenario = BookingScenario::Separate;
            ctx.state.current_group_index = next_index;
            ctx.state.pending_search_term = None;

            let display = ctx
                .state
                .current_group()
                .map(|g| {
                    g.services
                        .iter()
                        .map(|s| s.name.as_str())
                        .collect::<Vec<_>>()
                        .join(" più ")
                })
                .unwrap_or_else(|| second.name.clone());

            Ok((
                json!({"success": true, "center_name": center.name, "sorting_api_called": true}),
                Transition::to(create_collect_datetime_node(&display, &center.name)),
            ))
        }
        Err(e) => {
            log::warn!(
                "[Flow] Second-service sorting failed at {} ({}), searching a new center",
                center.name,
                e
            );
            Ok((
                json!({
                    "success": false,
                    "message": format!("Service not available at {}", center.name),
                }),
                Transition::to(create_center_search_node()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::{test_context_with, TestHarness};
    use crate::services::directory::{RawSortedService, RawSortingGroup};
    use crate::services::info::StaticInfoBackend;
    use crate::services::mock::MockDirectory;
    use crate::services::types::{HealthCenter, Sector, ServiceGroup};

    fn svc(uuid: &str, name: &str) -> HealthService {
        HealthService {
            uuid: uuid.into(),
            name: name.into(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }
    }

    fn harness_with_center(directory: MockDirectory) -> TestHarness {
        let mut harness = test_context_with(
            vec![svc("s2", "Visita Ortopedica (Prima Visita)")],
            directory,
            StaticInfoBackend::default(),
        );
        harness.state.selected_center = Some(HealthCenter {
            uuid: "c1".into(),
            name: "Delta Medica".into(),
            address: String::new(),
            city: "Rozzano".into(),
            district: "Milano".into(),
            phone: String::new(),
            region: "Lombardia".into(),
        });
        harness.state.select_service(svc("s1", "RX Caviglia Destra"));
        harness.state.service_groups = vec![ServiceGroup {
            services: vec![svc("s1", "RX Caviglia Destra")],
            is_group: false,
        }];
        harness
    }

    fn node_name(transition: &Transition) -> &'static str {
        match transition {
            Transition::TransitionTo(node) => node.name,
            Transition::StayOnNode => "(stay)",
        }
    }

    #[tokio::test]
    async fn exact_second_service_match_goes_straight_to_sorting() {
        let mut harness = harness_with_center(MockDirectory::default());
        harness.state.pending_search_term =
            Some("Visita Ortopedica (Prima Visita)".into());
        let mut ctx = harness.context();

        let (result, t) = perform_second_service_search(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(node_name(&t), "second_service_sorting");
        assert_eq!(ctx.state.selected_services.len(), 2);
    }

    #[tokio::test]
    async fn sorting_success_appends_a_group_and_reenters_datetime() {
        let mut harness = harness_with_center(MockDirectory {
            sorting_groups: vec![RawSortingGroup {
                health_services: vec![RawSortedService {
                    uuid: Some("s2".into()),
                    name: Some("Visita Ortopedica (Prima Visita)".into()),
                    health_service_code: None,
                }],
                group: false,
            }],
            ..MockDirectory::default()
        });
        harness.state.select_service(svc("s2", "Visita Ortopedica (Prima Visita)"));
        let mut ctx = harness.context();

        let (_, t) = perform_second_service_sorting(json!({}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "collect_datetime");
        assert_eq!(ctx.state.service_groups.len(), 2);
        assert_eq!(ctx.state.current_group_index, 1);
        assert_eq!(ctx.state.booking_scenario, BookingScenario::Separate);
    }

    #[tokio::test]
    async fn sorting_failure_falls_back_to_center_search() {
        let mut harness = harness_with_center(MockDirectory {
            sorting_fails: true,
            ..MockDirectory::default()
        });
        harness.state.select_service(svc("s2", "Visita Ortopedica (Prima Visita)"));
        let mut ctx = harness.context();

        let (result, t) = perform_second_service_sorting(json!({}), &mut ctx).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "center_search");
    }
}

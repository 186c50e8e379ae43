//! Service search and selection handlers.

use serde_json::{json, Value};

use crate::flow::handlers::{arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::patient_info::create_collect_address_node;
use crate::flow::nodes::service_selection::{
    create_search_retry_node, create_service_selection_node,
};
use crate::flow::{FlowContext, HandlerResult};
use crate::services::types::HealthService;
use crate::utils::normalize_spoken;

/// Finds an exact match between the spoken request and a service name:
/// case-folded, whitespace-collapsed equality, linear over the result set.
pub(crate) fn find_exact_match<'a>(
    search_term: &str,
    services: &'a [HealthService],
) -> Option<&'a HealthService> {
    let normalized_search = normalize_spoken(search_term);
    if normalized_search.is_empty() {
        return None;
    }

    for service in services {
        if normalize_spoken(&service.name) == normalized_search {
            log::info!(
                "[Flow] Exact match found: '{}' == '{}'",
                search_term,
                service.name
            );
            return Some(service);
        }
    }

    log::info!(
        "[Flow] No exact match for '{}' in {} services",
        search_term,
        services.len()
    );
    None
}

/// Runs the fuzzy search and routes the dialog: exact matches skip the
/// selection node and jump straight to address collection.
pub(crate) async fn run_search_and_route(
    ctx: &mut FlowContext<'_>,
    search_term: &str,
    limit: Option<usize>,
) -> HandlerResult {
    if search_term.chars().count() < 2 {
        let message = "Please provide the name of a service to search for.";
        return Ok((
            json!({"success": false, "message": message, "services": []}),
            Transition::to(create_search_retry_node(message)),
        ));
    }

    // Spoken filler keeps the line alive while the search runs.
    let _ = ctx
        .speech
        .speak(&format!("Cerco il servizio {}. Un momento.", search_term))
        .await;

    let result = ctx.services.search.search(search_term, limit);

    if result.found && !result.services.is_empty() {
        ctx.state.services_found = result.services.clone();
        ctx.state.current_search_term = Some(search_term.to_string());

        if let Some(exact) = find_exact_match(search_term, &result.services) {
            let exact = exact.clone();
            log::info!("[Flow] Auto-selecting exact match: {}", exact.name);
            ctx.state.select_service(exact.clone());

            return Ok((
                json!({
                    "success": true,
                    "auto_selected": true,
                    "service_name": exact.name,
                    "service_uuid": exact.uuid,
                    "message": format!("Found exact match: {}", exact.name),
                }),
                Transition::to(create_collect_address_node()),
            ));
        }

        let services_data: Vec<Value> = result
            .services
            .iter()
            .map(|s| json!({"name": s.name, "uuid": s.uuid}))
            .collect();

        Ok((
            json!({
                "success": true,
                "count": result.count,
                "services": services_data,
                "search_term": search_term,
                "message": format!("Found {} services for '{}'", result.count, search_term),
            }),
            Transition::to(create_service_selection_node(&result.services, search_term)),
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

/// `search_health_services`: fuzzy search with dynamic routing.
pub async fn search_health_services(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let search_term = arg_str(&args, "search_term");
    let limit = args.get("limit").and_then(Value::as_u64).map(|l| l as usize);

    log::info!(
        "[Flow] Searching health services: '{}' (limit: {:?})",
        search_term,
        limit
    );
    run_search_and_route(ctx, &search_term, limit).await
}

/// `select_service`: adopt one of the presented search results.
pub async fn select_service(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let service_uuid = arg_str(&args, "service_uuid");
    if service_uuid.is_empty() {
        return Ok(failure("Please select a service"));
    }

    let selected = ctx
        .state
        .services_found
        .iter()
        .find(|s| s.uuid == service_uuid)
        .cloned();

    let Some(service) = selected else {
        return Ok(failure("Service not found"));
    };

    log::info!("[Flow] Service selected: {}", service.name);
    ctx.state.select_service(service.clone());

    Ok((
        json!({
            "success": true,
            "service_name": service.name,
            "service_uuid": service.uuid,
        }),
        Transition::to(create_collect_address_node()),
    ))
}

/// `refine_search`: the caller speaks the full service name.
pub async fn refine_search(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let refined = arg_str(&args, "refined_search_term");
    if refined.chars().count() < 3 {
        return Ok(failure("Please provide a more specific service name"));
    }

    log::info!("[Flow] Refined search: '{}'", refined);
    run_search_and_route(ctx, &refined, Some(3)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::test_context;
    use crate::services::types::Sector;

    fn svc(uuid: &str, name: &str) -> HealthService {
        HealthService {
            uuid: uuid.into(),
            name: name.into(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }
    }

    #[test]
    fn exact_match_ignores_case_and_extra_spaces() {
        let services = vec![svc("u1", "RX Caviglia Destra ")];
        let found = find_exact_match("rx  caviglia   destra", &services);
        assert_eq!(found.unwrap().uuid, "u1");
    }

    #[test]
    fn exact_match_requires_full_equality() {
        let services = vec![svc("u1", "RX Caviglia Destra")];
        assert!(find_exact_match("rx caviglia", &services).is_none());
    }

    #[tokio::test]
    async fn exact_match_skips_selection_node() {
        let mut harness = test_context(vec![svc("u1", "RX Caviglia Destra")]);
        let mut ctx = harness.context();

        let (result, transition) = search_health_services(
            json!({"search_term": "RX Caviglia Destra"}),
            &mut ctx,
        )
        .await
        .unwrap();

        assert_eq!(result["auto_selected"], true);
        match transition {
            Transition::TransitionTo(node) => assert_eq!(node.name, "collect_address"),
            other => panic!("expected transition, got {:?}", other),
        }
        assert_eq!(ctx.state.selected_services.len(), 1);
    }

    #[tokio::test]
    async fn inexact_results_present_the_selection_node() {
        let mut harness = test_context(vec![
            svc("u1", "RX Caviglia Destra"),
            svc("u2", "RX Caviglia Sinistra"),
        ]);
        let mut ctx = harness.context();

        let (result, transition) =
            search_health_services(json!({"search_term": "rx caviglia"}), &mut ctx)
                .await
                .unwrap();

        assert_eq!(result["success"], true);
        match transition {
            Transition::TransitionTo(node) => assert_eq!(node.name, "service_selection"),
            other => panic!("expected transition, got {:?}", other),
        }
        assert!(ctx.state.selected_services.is_empty());
    }

    #[tokio::test]
    async fn short_query_routes_to_retry() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (result, transition) =
            search_health_services(json!({"search_term": "x"}), &mut ctx)
                .await
                .unwrap();

        assert_eq!(result["success"], false);
        match transition {
            Transition::TransitionTo(node) => assert_eq!(node.name, "search_retry"),
            other => panic!("expected retry node, got {:?}", other),
        }
    }
}

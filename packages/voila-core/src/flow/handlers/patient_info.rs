//! Patient information collection handlers: address, gender, date of
//! birth, and the recap verification.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::flow::handlers::{arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::booking::create_center_search_node;
use crate::flow::nodes::patient_info::{
    create_collect_address_node, create_collect_dob_node, create_collect_gender_node,
    create_verify_basic_info_node,
};
use crate::flow::{FlowContext, HandlerResult};

/// `collect_address` -> gender collection.
pub async fn collect_address(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let address = arg_str(&args, "address");
    if address.is_empty() {
        return Ok(failure("Please provide your address"));
    }

    log::info!("[Flow] Address collected: {}", address);
    ctx.state.patient_address = Some(address.clone());

    Ok((
        json!({"success": true, "address": address}),
        Transition::to(create_collect_gender_node()),
    ))
}

fn normalize_gender(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "m" | "male" | "maschio" => Some("m"),
        "f" | "female" | "femmina" => Some("f"),
        _ => None,
    }
}

/// `collect_gender` -> DOB collection.
pub async fn collect_gender(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let Some(gender) = normalize_gender(&arg_str(&args, "gender")) else {
        return Ok(failure("Please specify Male or Female"));
    };

    log::info!("[Flow] Gender collected: {}", gender);
    ctx.state.patient_gender = Some(gender.to_string());

    Ok((
        json!({"success": true, "gender": gender}),
        Transition::to(create_collect_dob_node()),
    ))
}

/// `collect_dob` -> verification of the collected basics.
pub async fn collect_dob(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let dob = arg_str(&args, "date_of_birth");
    if dob.is_empty() {
        return Ok(failure("Please provide your date of birth"));
    }
    if NaiveDate::parse_from_str(&dob, "%Y-%m-%d").is_err() {
        return Ok(failure("Please provide your date of birth again"));
    }

    log::info!("[Flow] DOB collected: {}", dob);
    ctx.state.patient_dob = Some(dob.clone());

    let address = ctx.state.patient_address.clone().unwrap_or_default();
    let gender = ctx.state.patient_gender.clone().unwrap_or_default();

    Ok((
        json!({"success": true, "date_of_birth": dob}),
        Transition::to(create_verify_basic_info_node(&address, &gender, &dob)),
    ))
}

/// `verify_basic_info`: confirm everything or change one field.
pub async fn verify_basic_info(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    match arg_str(&args, "action").as_str() {
        "confirm" => {
            log::info!("[Flow] Basic patient information verified, searching centers");
            Ok((
                json!({
                    "success": true,
                    "message": "Basic information verified, searching for health centers",
                }),
                Transition::to(create_center_search_node()),
            ))
        }
        "change" => {
            let field = arg_str(&args, "field_to_change");
            let new_value = arg_str(&args, "new_value");
            if field.is_empty() || new_value.is_empty() {
                return Ok(failure("Please specify what you want to change"));
            }

            match field.as_str() {
                "address" => {
                    log::info!("[Flow] Address updated to: {}", new_value);
                    ctx.state.patient_address = Some(new_value.clone());
                }
                "gender" => {
                    let Some(gender) = normalize_gender(&new_value) else {
                        return Ok(failure("Please specify Male or Female"));
                    };
                    log::info!("[Flow] Gender updated to: {}", gender);
                    ctx.state.patient_gender = Some(gender.to_string());
                }
                "date_of_birth" => {
                    log::info!("[Flow] DOB updated to: {}", new_value);
                    ctx.state.patient_dob = Some(new_value.clone());
                }
                other => {
                    return Ok(failure(&format!("Cannot change field '{}'", other)));
                }
            }

            let address = ctx.state.patient_address.clone().unwrap_or_default();
            let gender = ctx.state.patient_gender.clone().unwrap_or_default();
            let dob = ctx.state.patient_dob.clone().unwrap_or_default();

            Ok((
                json!({
                    "success": true,
                    "message": format!("Updated {}. Please verify again.", field),
                    "field_updated": field,
                    "new_value": new_value,
                }),
                Transition::to(create_verify_basic_info_node(&address, &gender, &dob)),
            ))
        }
        _ => {
            // Unintelligible answer: collect the basics again from scratch.
            log::info!("[Flow] Invalid verify action, restarting address collection");
            ctx.state.patient_address = None;
            ctx.state.patient_gender = None;
            ctx.state.patient_dob = None;

            Ok((
                json!({"success": false, "message": "Let's collect your information again."}),
                Transition::to(create_collect_address_node()),
            ))
        }
    }
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
    async fn chain_walks_address_gender_dob_verify() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (_, t) = collect_address(json!({"address": "Milano"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "collect_gender");

        let (_, t) = collect_gender(json!({"gender": "maschio"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "collect_dob");
        assert_eq!(ctx.state.patient_gender.as_deref(), Some("m"));

        let (_, t) = collect_dob(json!({"date_of_birth": "1989-04-29"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(node_name(&t), "verify_basic_info");
    }

    #[tokio::test]
    async fn malformed_dob_stays_on_node() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (result, t) = collect_dob(json!({"date_of_birth": "29 aprile"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(node_name(&t), "(stay)");
    }

    #[tokio::test]
    async fn confirm_moves_to_center_search() {
        let mut harness = test_context(vec![]);
        let mut ctx = harness.context();

        let (_, t) = verify_basic_info(json!({"action": "confirm"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "center_search");
    }

    #[tokio::test]
    async fn change_updates_one_field_and_reverifies() {
        let mut harness = test_context(vec![]);
        harness.state.patient_address = Some("Milano".into());
        harness.state.patient_gender = Some("m".into());
        harness.state.patient_dob = Some("1989-04-29".into());
        let mut ctx = harness.context();

        let (result, t) = verify_basic_info(
            json!({"action": "change", "field_to_change": "address", "new_value": "Torino"}),
            &mut ctx,
        )
        .await
        .unwrap();

        assert_eq!(result["field_updated"], "address");
        assert_eq!(ctx.state.patient_address.as_deref(), Some("Torino"));
        assert_eq!(node_name(&t), "verify_basic_info");
    }

    #[tokio::test]
    async fn invalid_action_restarts_collection() {
        let mut harness = test_context(vec![]);
        harness.state.patient_address = Some("Milano".into());
        let mut ctx = harness.context();

        let (_, t) = verify_basic_info(json!({"action": "boh"}), &mut ctx).await.unwrap();
        assert_eq!(node_name(&t), "collect_address");
        assert!(ctx.state.patient_address.is_none());
    }
}

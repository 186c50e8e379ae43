//! Patient detail collection and the final booking commit.

use serde_json::{json, Value};

use crate::flow::handlers::{arg_bool, arg_str, failure};
use crate::flow::node::Transition;
use crate::flow::nodes::completion::{create_booking_success_node, create_error_node};
use crate::flow::nodes::patient_details::{
    create_collect_first_name_node, create_collect_marketing_authorization_node,
    create_collect_phone_node, create_collect_reminder_authorization_node,
    create_collect_surname_node, create_confirm_phone_node,
};
use crate::flow::nodes::transfer::{create_transfer_node, TransferReason};
use crate::flow::{FlowContext, HandlerResult};
use crate::services::booking::{commit_booking, CommitParams};
use crate::utils::digits_only;

/// Words accepted as confirmation of the caller-ID phone number.
const CONFIRMATION_WORDS: [&str; 7] = ["yes", "si", "sì", "correct", "okay", "ok", "va bene"];

/// `collect_first_name` -> surname collection.
pub async fn collect_first_name(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let first_name = arg_str(&args, "first_name");
    if first_name.chars().count() < 2 {
        return Ok(failure("Please provide your first name"));
    }

    log::info!("[Flow] Patient first name collected: {}", first_name);
    ctx.state.patient_first_name = Some(first_name.clone());

    Ok((
        json!({"success": true, "first_name": first_name}),
        Transition::to(create_collect_surname_node()),
    ))
}

/// `collect_surname` -> phone collection.
pub async fn collect_surname(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let surname = arg_str(&args, "surname");
    if surname.chars().count() < 2 {
        return Ok(failure("Please provide your surname"));
    }

    log::info!("[Flow] Patient surname collected: {}", surname);
    ctx.state.patient_surname = Some(surname.clone());

    Ok((
        json!({"success": true, "surname": surname}),
        Transition::to(create_collect_phone_node()),
    ))
}

/// `collect_phone`: adopt the caller ID on a confirmation word, or validate
/// a dictated number.
///
/// The agent occasionally calls this with an empty argument; that is a
/// validation failure that keeps the node, never a crash.
pub async fn collect_phone(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    let raw_phone = arg_str(&args, "phone");
    let phone = raw_phone.to_lowercase();
    let caller_phone = ctx.state.caller_phone_from_peer.clone().unwrap_or_default();

    if phone.is_empty() {
        log::error!(
            "[Flow] collect_phone called with EMPTY phone parameter (args: {})",
            args
        );
        return Ok(failure("Please provide a valid phone number"));
    }

    let confirmed = CONFIRMATION_WORDS.contains(&phone.as_str());

    if confirmed && !caller_phone.is_empty() {
        // Caller-ID adoption: digits only, confirmation node skipped.
        let phone_clean = digits_only(&caller_phone);
        log::info!("[Flow] Using caller's phone number: {}", phone_clean);
        ctx.state.patient_phone = Some(phone_clean.clone());

        return Ok((
            json!({
                "success": true,
                "phone": phone_clean,
                "message": "Phone number confirmed (caller phone)",
                "skipped_confirmation": true,
            }),
            Transition::to(create_collect_reminder_authorization_node()),
        ));
    }

    if confirmed {
        // Confirmation word but no caller ID available: fall through to
        // explicit collection.
        log::error!("[Flow] User confirmed but no caller phone is known");
        return Ok(failure(
            "I don't have the number you are calling from. Please tell me your phone \
             number digit by digit.",
        ));
    }

    let phone_clean = digits_only(&phone);
    if phone_clean.len() < 8 {
        return Ok(failure(
            "Please provide a valid phone number with at least 8 digits",
        ));
    }

    log::info!("[Flow] Patient provided different phone: {}", phone_clean);
    ctx.state.patient_phone = Some(phone_clean.clone());

    Ok((
        json!({"success": true, "phone": phone_clean}),
        Transition::to(create_confirm_phone_node(&phone_clean)),
    ))
}

/// `confirm_phone`: the dictated number is read back for confirmation.
pub async fn confirm_phone(args: Value, ctx: &mut FlowContext<'_>) -> HandlerResult {
    match arg_str(&args, "action").as_str() {
        "confirm" => {
            log::info!("[Flow] Phone confirmed, proceeding to authorizations");
            Ok((
                json!({"success": true, "message": "Phone confirmed"}),
                Transition::to(create_collect_reminder_authorization_node()),
            ))
        }
        "change" => {
            log::info!("[Flow] Phone needs to be changed, collecting again");
            ctx.state.patient_phone = None;
            Ok((
                json!({"success": false, "message": "Let's collect your phone number again"}),
                Transition::to(create_collect_phone_node()),
            ))
        }
        _ => Ok(failure(
            "Please confirm if the phone number is correct or if you want to change it",
        )),
    }
}

/// `collect_reminder_authorization` -> marketing authorization.
pub async fn collect_reminder_authorization(
    args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let authorized = arg_bool(&args, "reminder_authorization");
    ctx.state.reminder_authorization = authorized;
    log::info!("[Flow] Reminder authorization: {}", authorized);

    Ok((
        json!({"success": true, "reminder_authorization": authorized}),
        Transition::to(create_collect_marketing_authorization_node()),
    ))
}

/// `collect_marketing_authorization`: last question before the commit; the
/// booking is created directly from here.
pub async fn collect_marketing_authorization(
    args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    let authorized = arg_bool(&args, "marketing_authorization");
    ctx.state.marketing_authorization = authorized;
    log::info!("[Flow] Marketing authorization: {}", authorized);

    confirm_details_and_create_booking(json!({"details_confirmed": true}), ctx).await
}

/// `confirm_details_and_create_booking`: validate the accumulated state and
/// run the final commit.
///
/// Refuses outright when no slot reservation survives - the reservation was
/// lost and committing would book nothing.
pub async fn confirm_details_and_create_booking(
    args: Value,
    ctx: &mut FlowContext<'_>,
) -> HandlerResult {
    if !arg_bool(&args, "details_confirmed") {
        log::info!("[Flow] Patient details not confirmed, restarting collection");
        return Ok((
            json!({"success": false, "message": "Let's collect your details again"}),
            Transition::to(create_collect_first_name_node()),
        ));
    }

    let state = &mut *ctx.state;

    if state.booked_slots.is_empty() {
        log::error!(
            "[Flow] booked_slots is empty at commit time - slot reservation was \
             skipped or lost"
        );
        return Ok((
            json!({
                "success": false,
                "message": "Slot reservation failed - cannot complete booking",
            }),
            Transition::to(create_error_node(
                "Slot reservation failed. The time slot was not properly reserved. \
                 Please start the booking process again.",
            )),
        ));
    }

    let patient_name = state.patient_first_name.clone().unwrap_or_default();
    let patient_surname = state.patient_surname.clone().unwrap_or_default();
    let patient_phone = state.patient_phone.clone().unwrap_or_default();

    let required_present = if state.patient_found_in_db {
        !patient_phone.is_empty()
    } else {
        !state.selected_services.is_empty()
            && !patient_name.is_empty()
            && !patient_surname.is_empty()
            && !patient_phone.is_empty()
    };

    if !required_present {
        log::error!("[Flow] Final validation failed - required booking fields missing");
        return Ok((
            json!({"success": false, "message": "Missing required information for booking"}),
            Transition::to(create_error_node(
                "Missing required information for booking. Please start over.",
            )),
        ));
    }

    let params = CommitParams {
        selected_services: state.selected_services.clone(),
        booked_slots: state.booked_slots.clone(),
        service_groups: state.service_groups.clone(),
        booking_scenario: state.booking_scenario,
        patient_name,
        patient_surname,
        patient_phone,
        patient_email: state.patient_email.clone().unwrap_or_default(),
        patient_gender: state.patient_gender.clone().unwrap_or_else(|| "m".into()),
        patient_dob: state.patient_dob.clone().unwrap_or_default(),
        reminder_authorization: state.reminder_authorization,
        marketing_authorization: state.marketing_authorization,
        patient_found_in_db: state.patient_found_in_db,
        patient_db_id: state.patient_db_id.clone().unwrap_or_default(),
    };

    let _ = ctx
        .speech
        .speak("Creazione della prenotazione con tutti i dettagli forniti. Attendi...")
        .await;

    match commit_booking(&ctx.services.directory, &params).await {
        Ok(confirmation) => {
            ctx.state.booking_completed = true;
            ctx.state.booking_in_progress = false;
            ctx.state.final_booking = Some(confirmation.clone());

            log::info!("[Flow] Booking created successfully: {}", confirmation.code);
            Ok((
                json!({
                    "success": true,
                    "booking_code": confirmation.code,
                    "booking_uuid": confirmation.uuid,
                }),
                Transition::to(create_booking_success_node(
                    &confirmation,
                    &ctx.state.booked_slots,
                )),
            ))
        }
        Err(e) => {
            log::error!("[Flow] Booking creation failed after retries: {}", e);
            // No operator outside opening hours; the error node closes out.
            let transition = if crate::bridge::protocol::transfers_blocked(
                &ctx.state.business_status,
            ) {
                Transition::to(create_error_node(
                    "La prenotazione non è andata a buon fine per un problema tecnico. \
                     La invito a richiamare più tardi.",
                ))
            } else {
                Transition::to(create_transfer_node(TransferReason::Technical))
            };
            Ok((
                json!({
                    "success": false,
                    "error": e.to_string(),
                    "message": "Mi dispiace, c'è un problema tecnico con la prenotazione \
                                finale. Ti trasferisco a un operatore.",
                }),
                transition,
            ))
        }
    }
}

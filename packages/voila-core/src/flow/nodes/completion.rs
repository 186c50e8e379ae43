//! Final booking completion and error nodes.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::greeting::search_function;
use crate::flow::nodes::LANGUAGE_CONFIG;
use crate::services::types::{BookingConfirmation, SlotReservation};

/// Celebrates a created booking and recaps every appointment.
pub fn create_booking_success_node(
    confirmation: &BookingConfirmation,
    booked_slots: &[SlotReservation],
) -> NodeConfig {
    let mut total_price = 0.0;
    let mut slot_lines = Vec::new();

    for slot in booked_slots {
        let mut price = slot.price;
        if price == 0.0 {
            if let Some(hs) = slot.health_services.first() {
                price = hs.price;
            }
        }
        total_price += price;
        slot_lines.push(format!(
            "{} il {} dalle {} - {:.2} euro",
            slot.service_name, slot.start_time, slot.end_time, price
        ));
    }

    let recap = slot_lines.join("\n");

    NodeConfig::named("booking_success")
        .role(format!(
            "Celebrate the completed booking with warmth and professionalism. Speak \
             times naturally, removing leading zeros from hours and minutes; for \
             times on the hour say 'in punto'. {LANGUAGE_CONFIG}"
        ))
        .task(format!(
            "Excellent! Your booking {} has been created successfully!\n\nYour \
             appointments:\n{recap}\n\nTotal cost: {total_price:.2} euro.\n\nYou will \
             receive a confirmation SMS with all the details. Thank you for choosing \
             Cerba Healthcare! Is there anything else I can help you with today?",
            confirmation.code
        ))
        .function(FunctionSchema::new(
            "start_new_booking",
            "Start a new booking process",
            json!({
                "search_term": {
                    "type": "string",
                    "description": "Name of the service to search for a new booking"
                }
            }),
            &["search_term"],
        ))
        .build()
}

/// Terminal error node with a caller-facing message.
pub fn create_error_node(message: &str) -> NodeConfig {
    NodeConfig::named("error")
        .role(format!(
            "Apologize and explain the problem calmly; invite the patient to start \
             over or call back. {LANGUAGE_CONFIG}"
        ))
        .task(message.to_string())
        .function(search_function())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::types::SlotHealthService;

    fn slot(price: f64, hs_price: f64) -> SlotReservation {
        SlotReservation {
            slot_uuid: "s".into(),
            service_name: "RX".into(),
            start_time: "2026-08-10T08:00:00+00:00".into(),
            end_time: "2026-08-10T08:20:00+00:00".into(),
            price,
            health_services: vec![SlotHealthService {
                uuid: "h".into(),
                name: "RX".into(),
                price: hs_price,
            }],
        }
    }

    #[test]
    fn zero_slot_price_falls_back_to_service_price() {
        let confirmation = BookingConfirmation {
            code: "BK-1".into(),
            ..BookingConfirmation::default()
        };
        let node = create_booking_success_node(&confirmation, &[slot(0.0, 42.0)]);
        assert!(node.task_messages[0].contains("42.00 euro"));
    }

    #[test]
    fn error_node_carries_the_message() {
        let node = create_error_node("Slot reservation failed. Please start again.");
        assert!(node.task_messages[0].contains("reservation failed"));
    }
}

//! Price inquiry summary node.
//!
//! Reached when the caller only wanted to know a price. From here they can
//! convert the inquiry into a booking (patient data is already collected, so
//! the flow re-enters the datetime step directly) or end the inquiry.

use serde_json::json;

use crate::flow::node::{FunctionSchema, NodeConfig};
use crate::flow::nodes::LANGUAGE_CONFIG;

pub fn create_price_summary_node(
    service_name: &str,
    center_name: &str,
    price: Option<f64>,
) -> NodeConfig {
    let price_text = match price {
        Some(price) => format!("{service_name} at {center_name} costs {price:.2} euro."),
        None => format!(
            "I could not retrieve an exact price for {service_name} at {center_name}; \
             it depends on the chosen slot."
        ),
    };

    NodeConfig::named("price_summary")
        .role(format!(
            "Give the patient the price information, then ask if they want to book \
             the service now or end here. On the answer call proceed_to_booking or \
             end_price_inquiry. Always say 'euro', never the symbol. {LANGUAGE_CONFIG}"
        ))
        .task(format!("{price_text} Would you like to book it now?"))
        .function(FunctionSchema::new(
            "proceed_to_booking",
            "Convert the price inquiry into a booking",
            json!({}),
            &[],
        ))
        .function(FunctionSchema::new(
            "end_price_inquiry",
            "End the price inquiry and return to the main menu",
            json!({}),
            &[],
        ))
        .build()
}

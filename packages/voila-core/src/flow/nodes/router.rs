//! Unified router node: the initial contact point.
//!
//! All the work here happens through the global functions (info lookups,
//! transfer, booking start, cancellation); the node itself carries no tools
//! of its own. The prompt adapts to the call-center status: outside opening
//! hours the agent must refuse transfers while keeping the informational and
//! booking paths open.

use crate::bridge::protocol::transfers_blocked;
use crate::flow::node::NodeConfig;
use crate::flow::nodes::LANGUAGE_CONFIG;

/// Builds the router node.
///
/// `reset_context` is set after a cancel-and-restart, so the agent announces
/// the cancellation instead of greeting again.
pub fn create_router_node(reset_context: bool, business_status: &str) -> NodeConfig {
    let transfer_status = if transfers_blocked(business_status) {
        "CALL CENTER STATUS: CLOSED. You CANNOT transfer calls to operators. \
         Never offer or propose a transfer. If the patient asks for one, say: \
         'Mi dispiace, il call center è attualmente chiuso. Non posso trasferirla \
         a un operatore in questo momento.' You CAN still answer info questions, \
         provide pricing, check exams and clinic hours, and start bookings."
    } else {
        "CALL CENTER STATUS: OPEN. Transfers to human operators are available."
    };

    let role = format!(
        "You are Ualà, a helpful virtual assistant for Cerba Healthcare (Piemonte, Italy). \
         You are the initial contact point for incoming calls. {transfer_status} \
         Decision logic: info question -> use the matching info tool \
         (knowledge_base_new, pricing, exams, call_graph); wants to book -> \
         start_booking; wants to cancel or move an appointment booked EARLIER -> \
         cancel_previous_appointment; wants to abandon the CURRENT booking -> \
         cancel_and_restart; wants a human -> request_transfer. \
         For multi-service requests call start_booking ONCE with the second \
         service in additional_service_request. NEVER answer without calling a \
         function first, and never claim to be checking without actually calling \
         it. {LANGUAGE_CONFIG}"
    );

    let task = if reset_context {
        "The previous booking has been cancelled. Say: 'La prenotazione è stata \
         annullata. Come posso aiutarti?'"
            .to_string()
    } else {
        "Greet the caller: 'Sono Ualà, assistente virtuale di Cerba HealthCare. \
         Puoi chiedermi informazioni o prenotare le prestazioni di poliambulatorio \
         e radiologia; per laboratorio e medicina dello sport devo passarti a un \
         mio collega.'"
            .to_string()
    };

    let mut builder = NodeConfig::named("router")
        .role(role)
        .task(task)
        .respond_immediately();
    if reset_context {
        builder = builder.reset_context();
    }
    builder.build()
}

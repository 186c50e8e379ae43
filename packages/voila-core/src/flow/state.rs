//! Per-session flow state.
//!
//! Owned by the flow manager and mutated only by the handler of the current
//! node. Everything the booking needs accumulates here: the selected
//! services, their grouped assignment, the reserved slots, and the patient's
//! details.

use crate::services::types::{
    AvailableSlot, BookingConfirmation, BookingScenario, HealthCenter, HealthService,
    ServiceGroup, SlotReservation,
};

/// What the caller is currently trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Booking,
    PriceInquiry,
}

/// Why a turn failed, for the transfer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The info tools had no answer.
    KnowledgeGap,
    /// The caller explicitly asked for a human.
    TransferRequest,
    /// An upstream call failed.
    Technical,
}

/// Failure bookkeeping: knowledge gaps and explicit requests transfer
/// immediately, technical failures only after three strikes.
#[derive(Debug, Default)]
pub struct FailureTracker {
    technical_failures: u32,
}

impl FailureTracker {
    /// Records a failure; true means the session should hand off to an
    /// operator.
    pub fn record(&mut self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::KnowledgeGap | FailureKind::TransferRequest => true,
            FailureKind::Technical => {
                self.technical_failures += 1;
                log::warn!(
                    "[Flow] Technical failure {}/3",
                    self.technical_failures
                );
                self.technical_failures >= 3
            }
        }
    }

    pub fn technical_failures(&self) -> u32 {
        self.technical_failures
    }
}

/// The accumulated state of one conversation.
#[derive(Default)]
pub struct FlowState {
    // Session context
    pub business_status: String,
    pub caller_phone_from_peer: Option<String>,
    pub intent: Option<Intent>,

    // Service search
    pub services_found: Vec<HealthService>,
    pub current_search_term: Option<String>,
    pub pending_search_term: Option<String>,
    pub second_service_request: Option<String>,

    // Booking
    pub selected_services: Vec<HealthService>,
    pub service_groups: Vec<ServiceGroup>,
    pub booking_scenario: BookingScenario,
    pub current_group_index: usize,
    pub scenario_reasoning: Option<String>,
    pub centers_found: Vec<HealthCenter>,
    pub selected_center: Option<HealthCenter>,
    pub available_slots: Vec<AvailableSlot>,
    pub booked_slots: Vec<SlotReservation>,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub is_cerba_member: bool,
    pub booking_in_progress: bool,
    pub booking_completed: bool,
    pub final_booking: Option<BookingConfirmation>,

    // Patient
    pub patient_first_name: Option<String>,
    pub patient_surname: Option<String>,
    pub patient_phone: Option<String>,
    pub patient_email: Option<String>,
    pub patient_gender: Option<String>,
    pub patient_dob: Option<String>,
    pub patient_address: Option<String>,
    pub patient_found_in_db: bool,
    pub patient_db_id: Option<String>,

    // Authorizations
    pub reminder_authorization: bool,
    pub marketing_authorization: bool,

    pub failures: FailureTracker,
}

impl FlowState {
    /// Fresh state for a session.
    pub fn new(business_status: impl Into<String>, caller_phone: Option<String>) -> Self {
        Self {
            business_status: business_status.into(),
            caller_phone_from_peer: caller_phone,
            ..Self::default()
        }
    }

    /// Adds a selected service, skipping duplicates.
    pub fn select_service(&mut self, service: HealthService) {
        if !self.selected_services.iter().any(|s| s.uuid == service.uuid) {
            self.selected_services.push(service);
        }
    }

    /// The group currently being scheduled, under a grouped scenario.
    pub fn current_group(&self) -> Option<&ServiceGroup> {
        self.service_groups.get(self.current_group_index)
    }

    /// True when every group has a reserved slot.
    pub fn all_groups_booked(&self) -> bool {
        if self.booking_scenario.is_grouped() && !self.service_groups.is_empty() {
            self.booked_slots.len() >= self.service_groups.len()
        } else {
            !self.booked_slots.is_empty()
        }
    }

    /// Patient date of birth in the compact `YYYYMMDD` wire form.
    pub fn dob_compact(&self) -> String {
        self.patient_dob
            .as_deref()
            .map(|dob| dob.replace('-', ""))
            .unwrap_or_default()
    }

    /// Clears everything a cancel-and-restart should forget, keeping the
    /// session context (business status, caller phone).
    pub fn reset_booking(&mut self) {
        let business_status = std::mem::take(&mut self.business_status);
        let caller_phone = self.caller_phone_from_peer.take();
        *self = Self::new(business_status, caller_phone);
    }
}

//! Scripted in-memory directory used by unit and integration tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};
use crate::services::directory::{
    BookingRequest, DirectoryApi, HealthCenterQuery, RawPatient, RawSortingGroup, SlotQuery,
};
use crate::services::types::{
    AvailableSlot, BookingConfirmation, HealthCenter, SlotHealthService, SlotReservation,
};

/// A [`DirectoryApi`] whose answers are fixed up front.
///
/// Booking commits can be scripted to fail a number of times before
/// succeeding, which is how the retry tests drive the two-attempt policy.
#[derive(Default)]
pub struct MockDirectory {
    pub centers: Vec<HealthCenter>,
    pub sorting_groups: Vec<RawSortingGroup>,
    pub sorting_fails: bool,
    pub slots: Vec<AvailableSlot>,
    pub patients: Vec<RawPatient>,
    /// How many booking commits fail before one succeeds.
    pub booking_failures_before_success: u32,

    pub booking_attempts: AtomicU32,
    pub reserved_slots: Mutex<Vec<String>>,
    pub committed_requests: Mutex<Vec<BookingRequest>>,
}

impl MockDirectory {
    pub fn booking_attempt_count(&self) -> u32 {
        self.booking_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryApi for MockDirectory {
    async fn search_health_centers(
        &self,
        _query: &HealthCenterQuery,
    ) -> BridgeResult<Vec<HealthCenter>> {
        Ok(self.centers.clone())
    }

    async fn sort_services(
        &self,
        _health_center_uuid: &str,
        _gender: &str,
        _date_of_birth: &str,
        _service_uuids: &[String],
    ) -> BridgeResult<Vec<RawSortingGroup>> {
        if self.sorting_fails {
            return Err(BridgeError::UpstreamUnavailable("sorting unavailable".into()));
        }
        Ok(self.sorting_groups.clone())
    }

    async fn search_slots(&self, _query: &SlotQuery) -> BridgeResult<Vec<AvailableSlot>> {
        Ok(self.slots.clone())
    }

    async fn reserve_slot(
        &self,
        slot: &AvailableSlot,
        service_name: &str,
    ) -> BridgeResult<SlotReservation> {
        let slot_uuid = format!("res-{}", slot.uuid);
        self.reserved_slots.lock().push(slot_uuid.clone());
        Ok(SlotReservation {
            slot_uuid,
            service_name: service_name.to_string(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            price: slot.price,
            health_services: vec![SlotHealthService {
                uuid: "mock-hs".into(),
                name: service_name.to_string(),
                price: slot.price,
            }],
        })
    }

    async fn search_patient_by_phone(&self, _phone: &str) -> BridgeResult<Vec<RawPatient>> {
        Ok(self.patients.clone())
    }

    async fn create_booking(&self, request: &BookingRequest) -> BridgeResult<BookingConfirmation> {
        let attempt = self.booking_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.booking_failures_before_success {
            return Err(BridgeError::UpstreamUnavailable(format!(
                "booking backend 503 (attempt {})",
                attempt
            )));
        }
        self.committed_requests.lock().push(request.clone());
        Ok(BookingConfirmation {
            uuid: "booking-uuid-1".into(),
            code: "BK-2024-001".into(),
            created_at: "2026-08-01T09:00:00Z".into(),
        })
    }
}

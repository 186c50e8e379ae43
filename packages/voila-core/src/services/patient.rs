//! Patient lookup by phone and date of birth.
//!
//! Caller-ID phones arrive in any format; they are normalized to the `+39…`
//! form before hitting the directory search. A lookup only counts as a match
//! when the date of birth agrees, so a shared family phone never binds the
//! wrong record.

use std::sync::Arc;

use crate::services::directory::DirectoryApi;
use crate::services::types::PatientRecord;
use crate::utils::digits_only;

/// Normalizes a phone number to the `+39…` form.
///
/// Returns `None` when no usable digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits = digits_only(raw.trim());
    if digits.is_empty() {
        return None;
    }

    if digits.starts_with("39") {
        return Some(format!("+{}", digits));
    }
    if digits.starts_with('3') || digits.len() >= 10 {
        return Some(format!("+39{}", digits));
    }

    log::warn!("[Patient] Could not normalize phone: {}", raw);
    None
}

/// Normalizes a date of birth; `YYYY-MM-DD` passes through, everything else
/// is trimmed and handed on as-is for the comparison to decide.
pub fn normalize_dob(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Finds a patient by phone and date of birth.
///
/// The phone search may return several records; only an exact DOB match is
/// adopted. Errors degrade to "not found" so a directory hiccup never kills
/// the booking flow.
pub async fn lookup_by_phone_and_dob(
    api: &Arc<dyn DirectoryApi>,
    phone: &str,
    dob: &str,
) -> Option<PatientRecord> {
    let normalized_phone = normalize_phone(phone)?;
    let normalized_dob = normalize_dob(dob)?;

    log::info!(
        "[Patient] Looking up patient: phone=***{}, dob={}",
        last_digits(&normalized_phone),
        normalized_dob
    );

    let patients = match api.search_patient_by_phone(&normalized_phone).await {
        Ok(patients) => patients,
        Err(e) => {
            log::error!("[Patient] Directory lookup failed: {}", e);
            return None;
        }
    };

    if patients.is_empty() {
        log::info!("[Patient] No patient found for phone ***{}", last_digits(&normalized_phone));
        return None;
    }

    for patient in &patients {
        let patient_dob = normalize_dob(&patient.date_of_birth).unwrap_or_default();
        if patient_dob == normalized_dob {
            let record = PatientRecord {
                id: patient.uuid.clone(),
                first_name: patient.name.clone(),
                last_name: patient.surname.clone(),
                dob: patient.date_of_birth.clone(),
                fiscal_code: patient.fiscal_code.clone(),
                phone: patient.phone.clone(),
                email: patient.email.clone(),
            };
            log::info!(
                "[Patient] Patient found: id={}, name={} {}",
                record.id,
                record.first_name,
                record.last_name
            );
            return Some(record);
        }
    }

    log::info!(
        "[Patient] Phone found but DOB mismatch: {} candidate(s), none match {}",
        patients.len(),
        normalized_dob
    );
    None
}

fn last_digits(phone: &str) -> &str {
    let len = phone.len();
    if len > 4 {
        &phone[len - 4..]
    } else {
        phone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeResult;
    use crate::services::directory::{
        BookingRequest, HealthCenterQuery, RawPatient, RawSortingGroup, SlotQuery,
    };
    use crate::services::types::{AvailableSlot, BookingConfirmation, HealthCenter, SlotReservation};
    use async_trait::async_trait;

    #[test]
    fn italian_numbers_keep_their_country_code() {
        assert_eq!(normalize_phone("393331234567").as_deref(), Some("+393331234567"));
        assert_eq!(normalize_phone("+39 333 1234567").as_deref(), Some("+393331234567"));
    }

    #[test]
    fn mobile_numbers_gain_the_country_code() {
        assert_eq!(normalize_phone("3331234567").as_deref(), Some("+393331234567"));
    }

    #[test]
    fn unusable_phones_normalize_to_none() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("abc"), None);
    }

    struct PhoneOnlyDirectory {
        patients: Vec<RawPatient>,
    }

    #[async_trait]
    impl DirectoryApi for PhoneOnlyDirectory {
        async fn search_health_centers(
            &self,
            _query: &HealthCenterQuery,
        ) -> BridgeResult<Vec<HealthCenter>> {
            Ok(Vec::new())
        }
        async fn sort_services(
            &self,
            _health_center_uuid: &str,
            _gender: &str,
            _date_of_birth: &str,
            _service_uuids: &[String],
        ) -> BridgeResult<Vec<RawSortingGroup>> {
            Ok(Vec::new())
        }
        async fn search_slots(&self, _query: &SlotQuery) -> BridgeResult<Vec<AvailableSlot>> {
            Ok(Vec::new())
        }
        async fn reserve_slot(
            &self,
            _slot: &AvailableSlot,
            _service_name: &str,
        ) -> BridgeResult<SlotReservation> {
            unimplemented!()
        }
        async fn search_patient_by_phone(&self, _phone: &str) -> BridgeResult<Vec<RawPatient>> {
            Ok(self.patients.clone())
        }
        async fn create_booking(
            &self,
            _request: &BookingRequest,
        ) -> BridgeResult<BookingConfirmation> {
            unimplemented!()
        }
    }

    fn patient(dob: &str) -> RawPatient {
        RawPatient {
            uuid: "p-1".into(),
            name: "Mario".into(),
            surname: "Rossi".into(),
            fiscal_code: String::new(),
            date_of_birth: dob.into(),
            phone: "+393331234567".into(),
            email: String::new(),
        }
    }

    #[tokio::test]
    async fn dob_match_adopts_the_record() {
        let api: Arc<dyn DirectoryApi> = Arc::new(PhoneOnlyDirectory {
            patients: vec![patient("1989-04-29")],
        });
        let found = lookup_by_phone_and_dob(&api, "3331234567", "1989-04-29").await;
        assert_eq!(found.unwrap().id, "p-1");
    }

    #[tokio::test]
    async fn dob_mismatch_is_not_a_match() {
        let api: Arc<dyn DirectoryApi> = Arc::new(PhoneOnlyDirectory {
            patients: vec![patient("1990-01-01")],
        });
        let found = lookup_by_phone_and_dob(&api, "3331234567", "1989-04-29").await;
        assert!(found.is_none());
    }
}

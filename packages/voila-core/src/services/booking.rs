//! Booking orchestration: sorting, slot search, reservation, patient
//! lookup, and the final transactional commit.
//!
//! The commit is the only step with a retry budget (two attempts, one second
//! apart); each reservation UUID enters exactly one commit attempt chain.
//! Double failure is reported as `UpstreamUnavailable`, which the flow turns
//! into an operator transfer.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};
use crate::services::directory::{
    BookingRequest, BookingServiceSlot, DirectoryApi, PatientPayload, RawSortingGroup, SlotQuery,
};
use crate::services::retry::retry_api_call;
use crate::services::types::{
    AvailableSlot, BookingConfirmation, BookingScenario, HealthService, Sector, ServiceGroup,
    SlotReservation,
};

/// Commit retry budget: two attempts, one second apart.
const COMMIT_ATTEMPTS: u32 = 2;
const COMMIT_RETRY_DELAY: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// Sorting
// ─────────────────────────────────────────────────────────────────────────────

/// Parses raw sorting groups, dropping malformed entries.
pub fn parse_sorting_groups(raw: &[RawSortingGroup]) -> Vec<ServiceGroup> {
    let mut groups = Vec::new();

    for group_data in raw {
        let services: Vec<HealthService> = group_data
            .health_services
            .iter()
            .filter_map(|svc| {
                let uuid = svc.uuid.clone()?;
                let name = svc.name.clone()?;
                Some(HealthService {
                    uuid,
                    name,
                    code: svc.health_service_code.clone().unwrap_or_default(),
                    synonyms: Vec::new(),
                    sector: Sector::HealthServices,
                })
            })
            .collect();

        if !services.is_empty() {
            groups.push(ServiceGroup {
                services,
                is_group: group_data.group,
            });
        }
    }

    groups
}

/// Requests a grouped assignment of the selected services at one center.
pub async fn run_sorting(
    api: &Arc<dyn DirectoryApi>,
    health_center_uuid: &str,
    gender: &str,
    date_of_birth_compact: &str,
    services: &[HealthService],
) -> BridgeResult<Vec<ServiceGroup>> {
    let uuids: Vec<String> = services.iter().map(|s| s.uuid.clone()).collect();
    let raw = api
        .sort_services(health_center_uuid, gender, date_of_birth_compact, &uuids)
        .await?;

    let groups = parse_sorting_groups(&raw);
    if groups.is_empty() {
        return Err(BridgeError::UpstreamUnavailable(
            "sorting returned no valid groups".into(),
        ));
    }

    log::info!(
        "[Booking] Sorting produced {} group(s) for {} service(s)",
        groups.len(),
        services.len()
    );
    Ok(groups)
}

// ─────────────────────────────────────────────────────────────────────────────
// Slots
// ─────────────────────────────────────────────────────────────────────────────

/// Searches open slots for one appointment group around the caller's
/// preferred date and time.
pub async fn search_group_slots(
    api: &Arc<dyn DirectoryApi>,
    health_center_uuid: &str,
    group: &ServiceGroup,
    preferred_date: &str,
    preferred_time: &str,
) -> BridgeResult<Vec<AvailableSlot>> {
    let query = SlotQuery {
        health_center_uuid: health_center_uuid.to_string(),
        health_services: group.services.iter().map(|s| s.uuid.clone()).collect(),
        preferred_date: preferred_date.to_string(),
        preferred_time: preferred_time.to_string(),
    };
    api.search_slots(&query).await
}

/// Reserves one slot for a group. The display name joins bundled services.
pub async fn reserve_group_slot(
    api: &Arc<dyn DirectoryApi>,
    slot: &AvailableSlot,
    group: &ServiceGroup,
) -> BridgeResult<SlotReservation> {
    let service_name = group
        .services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" + ");
    api.reserve_slot(slot, &service_name).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Commit
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the final commit needs out of the flow state.
#[derive(Debug, Clone)]
pub struct CommitParams {
    pub selected_services: Vec<HealthService>,
    pub booked_slots: Vec<SlotReservation>,
    pub service_groups: Vec<ServiceGroup>,
    pub booking_scenario: BookingScenario,
    pub patient_name: String,
    pub patient_surname: String,
    pub patient_phone: String,
    pub patient_email: String,
    pub patient_gender: String,
    pub patient_dob: String,
    pub reminder_authorization: bool,
    pub marketing_authorization: bool,
    pub patient_found_in_db: bool,
    pub patient_db_id: String,
}

/// Maps services to reserved slot UUIDs.
///
/// Grouped scenarios submit every service of group *i* with
/// `booked_slots[i]`; the legacy path maps selected services 1:1 onto the
/// slots.
pub fn build_health_services(
    scenario: BookingScenario,
    service_groups: &[ServiceGroup],
    selected_services: &[HealthService],
    booked_slots: &[SlotReservation],
) -> Vec<BookingServiceSlot> {
    let mut mapped = Vec::new();

    if scenario.is_grouped() && !service_groups.is_empty() {
        for (group_index, group) in service_groups.iter().enumerate() {
            let Some(slot) = booked_slots.get(group_index) else {
                continue;
            };
            log::info!(
                "[Booking]   Group {}: {} service(s), bundled={}, slot={}",
                group_index,
                group.services.len(),
                group.is_group,
                slot.slot_uuid
            );
            for service in &group.services {
                mapped.push(BookingServiceSlot {
                    uuid: service.uuid.clone(),
                    slot: slot.slot_uuid.clone(),
                });
            }
        }
    } else {
        for (i, service) in selected_services.iter().enumerate() {
            let Some(slot) = booked_slots.get(i) else {
                continue;
            };
            mapped.push(BookingServiceSlot {
                uuid: service.uuid.clone(),
                slot: slot.slot_uuid.clone(),
            });
        }
    }

    mapped
}

/// Builds the patient payload: known patients shrink to their UUID, new
/// patients carry their full details with the gender uppercased.
fn build_patient_payload(params: &CommitParams) -> PatientPayload {
    if params.patient_found_in_db && !params.patient_db_id.is_empty() {
        log::info!(
            "[Booking] Using simplified payload with patient UUID only: {}",
            params.patient_db_id
        );
        PatientPayload::Existing {
            uuid: params.patient_db_id.clone(),
        }
    } else {
        log::info!("[Booking] Creating booking for new patient with full details");
        PatientPayload::New {
            name: params.patient_name.clone(),
            surname: params.patient_surname.clone(),
            email: (!params.patient_email.is_empty()).then(|| params.patient_email.clone()),
            phone: params.patient_phone.clone(),
            date_of_birth: params.patient_dob.clone(),
            gender: params.patient_gender.to_uppercase(),
        }
    }
}

/// Commits the booking with the standard retry budget.
///
/// Precondition: `booked_slots` is non-empty; an empty list is an integrity
/// violation and no HTTP call is made.
pub async fn commit_booking(
    api: &Arc<dyn DirectoryApi>,
    params: &CommitParams,
) -> BridgeResult<BookingConfirmation> {
    if params.booked_slots.is_empty() {
        return Err(BridgeError::Integrity(
            "booking commit attempted with no reserved slots".into(),
        ));
    }

    log::info!(
        "[Booking] Commit mapping: scenario={}, groups={}, slots={}",
        params.booking_scenario.as_str(),
        params.service_groups.len(),
        params.booked_slots.len()
    );

    let request = BookingRequest {
        patient: build_patient_payload(params),
        booking_type: "private",
        health_services: build_health_services(
            params.booking_scenario,
            &params.service_groups,
            &params.selected_services,
            &params.booked_slots,
        ),
        reminder_authorization: params.reminder_authorization,
        marketing_authorization: params.marketing_authorization,
    };

    let api = Arc::clone(api);
    let confirmation = retry_api_call("Booking Creation API", COMMIT_ATTEMPTS, COMMIT_RETRY_DELAY, || {
        let api = Arc::clone(&api);
        let request = request.clone();
        async move { api.create_booking(&request).await }
    })
    .await?;

    log::info!("[Booking] Booking created: code={}", confirmation.code);
    Ok(confirmation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::RawSortedService;
    use crate::services::mock::MockDirectory;

    fn svc(uuid: &str, name: &str) -> HealthService {
        HealthService {
            uuid: uuid.to_string(),
            name: name.to_string(),
            code: String::new(),
            synonyms: Vec::new(),
            sector: Sector::HealthServices,
        }
    }

    fn slot(uuid: &str) -> SlotReservation {
        SlotReservation {
            slot_uuid: uuid.to_string(),
            service_name: "svc".into(),
            start_time: "2026-08-10T08:00:00+00:00".into(),
            end_time: "2026-08-10T08:20:00+00:00".into(),
            price: 50.0,
            health_services: Vec::new(),
        }
    }

    fn params(scenario: BookingScenario, groups: Vec<ServiceGroup>, slots: Vec<SlotReservation>) -> CommitParams {
        CommitParams {
            selected_services: vec![svc("s1", "RX Caviglia Destra")],
            booked_slots: slots,
            service_groups: groups,
            booking_scenario: scenario,
            patient_name: "Mario".into(),
            patient_surname: "Rossi".into(),
            patient_phone: "393331234567".into(),
            patient_email: String::new(),
            patient_gender: "m".into(),
            patient_dob: "1989-04-29".into(),
            reminder_authorization: true,
            marketing_authorization: false,
            patient_found_in_db: false,
            patient_db_id: String::new(),
        }
    }

    #[test]
    fn parse_drops_entries_without_uuid_or_name() {
        let raw = vec![RawSortingGroup {
            health_services: vec![
                RawSortedService {
                    uuid: Some("u1".into()),
                    name: Some("RX".into()),
                    health_service_code: Some("R1".into()),
                },
                RawSortedService {
                    uuid: None,
                    name: Some("broken".into()),
                    health_service_code: None,
                },
            ],
            group: true,
        }];
        let groups = parse_sorting_groups(&raw);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].services.len(), 1);
        assert!(groups[0].is_group);
    }

    #[test]
    fn grouped_mapping_shares_the_group_slot() {
        let groups = vec![
            ServiceGroup {
                services: vec![svc("a", "A"), svc("b", "B")],
                is_group: true,
            },
            ServiceGroup {
                services: vec![svc("c", "C")],
                is_group: false,
            },
        ];
        let slots = vec![slot("slot-0"), slot("slot-1")];

        let mapped = build_health_services(
            BookingScenario::Separate,
            &groups,
            &[svc("a", "A")],
            &slots,
        );

        // Every service of group i carries booked_slots[i].
        assert_eq!(mapped.len(), 3);
        assert!(mapped[0].slot == "slot-0" && mapped[1].slot == "slot-0");
        assert_eq!(mapped[2].slot, "slot-1");

        // Invariant: total mapped services equals the sum over groups, and
        // every reserved slot UUID is referenced.
        let total: usize = groups.iter().map(|g| g.services.len()).sum();
        assert_eq!(mapped.len(), total);
        for s in &slots {
            assert!(mapped.iter().any(|m| m.slot == s.slot_uuid));
        }
    }

    #[test]
    fn legacy_mapping_is_one_to_one() {
        let selected = vec![svc("a", "A"), svc("b", "B")];
        let slots = vec![slot("slot-0"), slot("slot-1")];
        let mapped = build_health_services(BookingScenario::Legacy, &[], &selected, &slots);

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].uuid, "a");
        assert_eq!(mapped[0].slot, "slot-0");
        assert_eq!(mapped[1].slot, "slot-1");
    }

    #[tokio::test]
    async fn commit_refuses_empty_reservations_without_calling_upstream() {
        let mock = Arc::new(MockDirectory::default());
        let api: Arc<dyn DirectoryApi> = mock.clone();

        let err = commit_booking(&api, &params(BookingScenario::Legacy, vec![], vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "integrity_error");
        assert_eq!(mock.booking_attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_retries_once_and_succeeds() {
        let mock = Arc::new(MockDirectory {
            booking_failures_before_success: 1,
            ..MockDirectory::default()
        });
        let api: Arc<dyn DirectoryApi> = mock.clone();

        let confirmation = commit_booking(
            &api,
            &params(BookingScenario::Legacy, vec![], vec![slot("slot-0")]),
        )
        .await
        .unwrap();

        assert_eq!(confirmation.code, "BK-2024-001");
        assert_eq!(mock.booking_attempt_count(), 2);
        // One commit chain, one committed request.
        assert_eq!(mock.committed_requests.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_gives_up_after_two_attempts() {
        let mock = Arc::new(MockDirectory {
            booking_failures_before_success: 5,
            ..MockDirectory::default()
        });
        let api: Arc<dyn DirectoryApi> = mock.clone();

        let err = commit_booking(
            &api,
            &params(BookingScenario::Legacy, vec![], vec![slot("slot-0")]),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(mock.booking_attempt_count(), 2);
    }

    #[tokio::test]
    async fn existing_patient_commits_with_uuid_only() {
        let mock = Arc::new(MockDirectory::default());
        let api: Arc<dyn DirectoryApi> = mock.clone();

        let mut p = params(BookingScenario::Legacy, vec![], vec![slot("slot-0")]);
        p.patient_found_in_db = true;
        p.patient_db_id = "patient-7".into();

        commit_booking(&api, &p).await.unwrap();

        let committed = mock.committed_requests.lock();
        assert_eq!(
            committed[0].patient,
            PatientPayload::Existing { uuid: "patient-7".into() }
        );
    }

    #[tokio::test]
    async fn new_patient_commits_with_uppercased_gender() {
        let mock = Arc::new(MockDirectory::default());
        let api: Arc<dyn DirectoryApi> = mock.clone();

        commit_booking(&api, &params(BookingScenario::Legacy, vec![], vec![slot("slot-0")]))
            .await
            .unwrap();

        let committed = mock.committed_requests.lock();
        match &committed[0].patient {
            PatientPayload::New { gender, email, .. } => {
                assert_eq!(gender, "M");
                assert!(email.is_none());
            }
            other => panic!("expected new patient payload, got {:?}", other),
        }
    }
}

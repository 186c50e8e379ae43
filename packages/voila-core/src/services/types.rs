//! Domain types shared across the services layer.

use serde::{Deserialize, Serialize};

/// Catalog sector a service belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    #[default]
    HealthServices,
    Prescriptions,
    PreliminaryVisits,
    Optionals,
    Opinions,
}

/// One bookable health service. Immutable catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthService {
    pub uuid: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub sector: Sector,
}

/// One health center. Immutable directory data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCenter {
    pub uuid: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub district: String,
    pub phone: String,
    pub region: String,
}

/// Output of the sorting step: each group is booked as one appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub services: Vec<HealthService>,
    pub is_group: bool,
}

/// How grouped services map to appointment slots at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingScenario {
    /// 1:1 mapping between selected services and booked slots.
    #[default]
    Legacy,
    /// One appointment carrying all services of a single group.
    Bundle,
    /// One appointment for a combined/replacement service.
    Combined,
    /// One appointment per group.
    Separate,
}

impl BookingScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Bundle => "bundle",
            Self::Combined => "combined",
            Self::Separate => "separate",
        }
    }

    /// True for the scenarios that map slots through `service_groups`.
    pub fn is_grouped(&self) -> bool {
        !matches!(self, Self::Legacy)
    }
}

/// A service offered inside a reserved slot, as returned by the reservation
/// endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotHealthService {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

/// An ephemeral slot reservation, held until the final booking commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotReservation {
    pub slot_uuid: String,
    pub service_name: String,
    /// UTC ISO-8601.
    pub start_time: String,
    pub end_time: String,
    pub price: f64,
    #[serde(default)]
    pub health_services: Vec<SlotHealthService>,
}

/// An open slot returned by the availability search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlot {
    /// Availability identifier used to reserve the slot.
    pub uuid: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub price: f64,
}

/// Result of a fuzzy catalog search.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSearchResponse {
    pub found: bool,
    pub count: usize,
    pub services: Vec<HealthService>,
    pub search_term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An existing patient found in the directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// YYYY-MM-DD.
    pub dob: String,
    #[serde(default)]
    pub fiscal_code: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// The booking returned by a successful commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingConfirmation {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub created_at: String,
}

//! Healthcare directory and booking API client.
//!
//! Everything the booking flow needs from the backend sits behind the
//! [`DirectoryApi`] trait: center search, service sorting, slot
//! availability, slot reservation, patient search, and the final booking
//! commit. The reqwest implementation authenticates with a bearer token;
//! tests substitute their own implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::services::types::{
    AvailableSlot, BookingConfirmation, HealthCenter, SlotReservation,
};

// ─────────────────────────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Query for the health-center search.
#[derive(Debug, Clone)]
pub struct HealthCenterQuery {
    /// Service UUIDs, joined with commas on the wire.
    pub health_services: Vec<String>,
    /// "m" or "f".
    pub gender: String,
    /// YYYYMMDD.
    pub date_of_birth: String,
    /// Address or city to search around.
    pub address: String,
    pub health_services_availability: bool,
}

/// One group as returned by the sorting endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSortingGroup {
    #[serde(default)]
    pub health_services: Vec<RawSortedService>,
    #[serde(default)]
    pub group: bool,
}

/// One service inside a sorting group.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSortedService {
    pub uuid: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub health_service_code: Option<String>,
}

/// Query for the slot availability search of one group.
#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub health_center_uuid: String,
    pub health_services: Vec<String>,
    /// YYYY-MM-DD.
    pub preferred_date: String,
    /// HH:MM, empty when the caller had no preference.
    pub preferred_time: String,
}

/// A patient as returned by the directory search.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPatient {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub fiscal_code: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// Patient payload of the booking commit.
///
/// Existing patients travel as their UUID alone; the backend holds the rest.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PatientPayload {
    Existing {
        uuid: String,
    },
    New {
        name: String,
        surname: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        phone: String,
        date_of_birth: String,
        /// Uppercased on the wire.
        gender: String,
    },
}

/// One service/slot pair of the booking commit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingServiceSlot {
    pub uuid: String,
    pub slot: String,
}

/// Body of the booking commit.
#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub patient: PatientPayload,
    pub booking_type: &'static str,
    pub health_services: Vec<BookingServiceSlot>,
    pub reminder_authorization: bool,
    pub marketing_authorization: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Backend operations used by the booking flow.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Centers offering the given services near an address.
    async fn search_health_centers(
        &self,
        query: &HealthCenterQuery,
    ) -> BridgeResult<Vec<HealthCenter>>;

    /// Groups the selected services into appointments at one center.
    async fn sort_services(
        &self,
        health_center_uuid: &str,
        gender: &str,
        date_of_birth: &str,
        service_uuids: &[String],
    ) -> BridgeResult<Vec<RawSortingGroup>>;

    /// Open slots for one appointment group.
    async fn search_slots(&self, query: &SlotQuery) -> BridgeResult<Vec<AvailableSlot>>;

    /// Reserves one slot; the reservation stays ephemeral until the commit.
    async fn reserve_slot(
        &self,
        slot: &AvailableSlot,
        service_name: &str,
    ) -> BridgeResult<SlotReservation>;

    /// Patients matching a phone number.
    async fn search_patient_by_phone(&self, phone: &str) -> BridgeResult<Vec<RawPatient>>;

    /// Commits the booking. Each reservation UUID is used in at most one
    /// commit attempt chain.
    async fn create_booking(&self, request: &BookingRequest) -> BridgeResult<BookingConfirmation>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Bearer-authenticated reqwest implementation of [`DirectoryApi`].
pub struct DirectoryClient {
    base_url: String,
    token: RwLock<Option<String>>,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: RwLock::new(token),
            http: reqwest::Client::new(),
        }
    }

    /// Replaces the bearer token (e.g. after a refresh).
    pub fn set_token(&self, token: String) {
        *self.token.write() = Some(token);
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    fn bearer(&self) -> BridgeResult<String> {
        self.token
            .read()
            .clone()
            .ok_or_else(|| BridgeError::Configuration("directory API token not configured".into()))
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> BridgeResult<Value> {
        let token = self.bearer()?;
        let url = self.url(endpoint);
        log::debug!("[Directory] GET {} params={:?}", url, params);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;

        self.check_status(endpoint, response).await
    }

    async fn post_json(&self, endpoint: &str, body: &impl Serialize) -> BridgeResult<Value> {
        let token = self.bearer()?;
        let url = self.url(endpoint);
        log::debug!("[Directory] POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        self.check_status(endpoint, response).await
    }

    async fn check_status(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> BridgeResult<Value> {
        let status = response.status();

        if status.as_u16() == 401 {
            log::warn!("[Directory] Authentication failed, clearing token cache");
            *self.token.write() = None;
            return Err(BridgeError::UpstreamUnavailable(
                "authentication failed - token may be expired".into(),
            ));
        }

        if status.is_client_error() || status.is_server_error() {
            let detail = response.text().await.unwrap_or_default();
            log::error!(
                "[Directory] {} failed with status {}: {}",
                endpoint,
                status,
                detail
            );
            return Err(BridgeError::UpstreamUnavailable(format!(
                "{} failed with status {}",
                endpoint, status
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DirectoryApi for DirectoryClient {
    async fn search_health_centers(
        &self,
        query: &HealthCenterQuery,
    ) -> BridgeResult<Vec<HealthCenter>> {
        #[derive(Deserialize)]
        struct RawCenter {
            uuid: String,
            name: String,
            address: String,
            #[serde(default)]
            street_number: String,
            city: String,
            #[serde(default)]
            district: String,
            #[serde(default)]
            phone: String,
            #[serde(default)]
            region: String,
        }

        let params = [
            ("health_services", query.health_services.join(",")),
            ("gender", query.gender.clone()),
            ("date_of_birth", query.date_of_birth.clone()),
            ("address", query.address.clone()),
            (
                "health_services_availability",
                query.health_services_availability.to_string(),
            ),
        ];

        let value = self.get_json("amb/health-center", &params).await?;
        let raw: Vec<RawCenter> = serde_json::from_value(value)?;

        let centers: Vec<HealthCenter> = raw
            .into_iter()
            .map(|c| HealthCenter {
                uuid: c.uuid,
                name: c.name,
                address: format!("{} {}, {}", c.address, c.street_number, c.city),
                city: c.city,
                district: c.district,
                phone: c.phone,
                region: c.region,
            })
            .collect();

        log::info!(
            "[Directory] Found {} health centers for {} services",
            centers.len(),
            query.health_services.len()
        );
        Ok(centers)
    }

    async fn sort_services(
        &self,
        health_center_uuid: &str,
        gender: &str,
        date_of_birth: &str,
        service_uuids: &[String],
    ) -> BridgeResult<Vec<RawSortingGroup>> {
        let params = [
            ("health_center", health_center_uuid.to_string()),
            ("gender", gender.to_string()),
            ("date_of_birth", date_of_birth.to_string()),
            ("health_services", service_uuids.join(",")),
        ];

        let value = self.get_json("amb/health-service/sorting", &params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn search_slots(&self, query: &SlotQuery) -> BridgeResult<Vec<AvailableSlot>> {
        let mut params = vec![
            ("health_center", query.health_center_uuid.clone()),
            ("health_services", query.health_services.join(",")),
            ("date", query.preferred_date.clone()),
        ];
        if !query.preferred_time.is_empty() {
            params.push(("time", query.preferred_time.clone()));
        }

        let value = self.get_json("amb/availability", &params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn reserve_slot(
        &self,
        slot: &AvailableSlot,
        service_name: &str,
    ) -> BridgeResult<SlotReservation> {
        #[derive(Serialize)]
        struct ReserveBody<'a> {
            availability: &'a str,
        }

        let value = self
            .post_json("amb/slot", &ReserveBody { availability: &slot.uuid })
            .await?;

        let slot_uuid = value
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Protocol("slot reservation without uuid".into()))?
            .to_string();
        let health_services = value
            .get("health_services")
            .cloned()
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();

        log::info!(
            "[Directory] Reserved slot {} for {} at {}",
            slot_uuid,
            service_name,
            slot.start_time
        );

        Ok(SlotReservation {
            slot_uuid,
            service_name: service_name.to_string(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            price: slot.price,
            health_services,
        })
    }

    async fn search_patient_by_phone(&self, phone: &str) -> BridgeResult<Vec<RawPatient>> {
        if phone.is_empty() {
            log::warn!("[Directory] Patient search called with empty phone");
            return Ok(Vec::new());
        }

        let params = [("phone", phone.to_string())];
        match self.get_json("search/patient", &params).await {
            Ok(Value::Array(items)) => {
                let patients: Vec<RawPatient> =
                    serde_json::from_value(Value::Array(items)).unwrap_or_default();
                log::info!("[Directory] Found {} patient(s) by phone", patients.len());
                Ok(patients)
            }
            Ok(other) => {
                log::warn!(
                    "[Directory] Unexpected response shape from search/patient: {}",
                    other
                );
                Ok(Vec::new())
            }
            // Not found is a normal outcome, not an error.
            Err(BridgeError::UpstreamUnavailable(msg)) if msg.contains("404") => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn create_booking(&self, request: &BookingRequest) -> BridgeResult<BookingConfirmation> {
        let value = self.post_json("amb/booking", request).await?;

        let booking = value.get("booking").cloned().unwrap_or(value);
        Ok(serde_json::from_value(booking)?)
    }
}

//! One-shot persistence of the initial call-statistics row.
//!
//! On every `start` event the bridge inserts one `tb_stat` row keyed by
//! call id; the voice-agent side updates it when the call ends. Text columns
//! are initialized to `"N/A"`, numerics to 0 or NULL per the column
//! contract. Failure is never fatal to the call: it is logged and the
//! session continues.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;

/// Region recorded with every call handled by this bridge.
const REGION: &str = "Piemonte";

/// Parameters of the initial call record.
#[derive(Debug, Clone)]
pub struct NewCallRecord {
    pub call_id: String,
    pub assistant_id: String,
    pub interaction_id: String,
    pub phone_number: String,
    pub stream_sid: String,
}

/// Writes the initial call record, if a database is configured.
pub struct StatsWriter {
    database_url: Option<String>,
    pool: OnceCell<Option<PgPool>>,
    attempts: std::sync::atomic::AtomicU64,
}

impl StatsWriter {
    /// Creates a writer. `None` disables persistence entirely.
    pub fn new(database_url: Option<String>) -> Self {
        if database_url.is_none() {
            log::warn!("[Stats] Database credentials not configured - call records disabled");
        }
        Self {
            database_url,
            pool: OnceCell::new(),
            attempts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// A writer that never persists anything. Used in tests and when the
    /// environment carries no credentials.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// How many call records were attempted, successful or not. One `start`
    /// event maps to exactly one attempt.
    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn pool(&self) -> Option<&PgPool> {
        let url = self.database_url.as_deref()?;
        self.pool
            .get_or_init(|| async {
                match PgPoolOptions::new()
                    .max_connections(2)
                    .acquire_timeout(std::time::Duration::from_secs(10))
                    .connect(url)
                    .await
                {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        log::error!("[Stats] Database connection failed: {}", e);
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Inserts the initial `tb_stat` row for a call. Conflicting call ids
    /// are ignored so retries stay idempotent.
    ///
    /// Exactly one insert attempt happens per processed `start` event; its
    /// outcome never interrupts the call.
    pub async fn record_call_start(&self, record: NewCallRecord) -> bool {
        self.attempts
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let Some(pool) = self.pool().await else {
            return false;
        };

        let interaction_id = if record.interaction_id.is_empty() {
            "N/A".to_string()
        } else {
            record.interaction_id.clone()
        };
        let phone_number = if record.phone_number.is_empty() {
            "N/A".to_string()
        } else {
            record.phone_number.clone()
        };

        let query = r#"
        INSERT INTO tb_stat (
            call_id, interaction_id, phone_number, assistant_id, started_at,
            service, action, sentiment, esito_chiamata, summary,
            motivazione, patient_intent, transcript, region, ended_at,
            duration_seconds, cost, llm_token, call_type, patient_first_name,
            patient_surname, patient_dob, patient_gender, patient_address, selected_services,
            search_terms_used, selected_center_uuid, selected_center_name, selected_center_address, selected_center_city,
            booked_slots, preferred_date, preferred_time, appointment_datetime, booking_code,
            total_booking_cost, is_cerba_member, reminder_authorization, marketing_authorization, transfer_reason,
            transfer_timestamp, recording_url_stereo, recording_url_user, recording_url_bot, recording_duration_seconds
        ) VALUES (
            $1, $2, $3, $4, $5,
            'N/A', 'N/A', 'N/A', 'N/A', 'N/A',
            'N/A', 'N/A', 'N/A', $6, NULL,
            NULL, NULL, 0, 'N/A', 'N/A',
            'N/A', 'N/A', 'N/A', 'N/A', NULL,
            NULL, NULL, 'N/A', 'N/A', 'N/A',
            NULL, 'N/A', 'N/A', NULL, 'N/A',
            NULL, FALSE, FALSE, FALSE, 'N/A',
            NULL, 'N/A', 'N/A', 'N/A', NULL
        )
        ON CONFLICT (call_id) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(&record.call_id)
            .bind(&interaction_id)
            .bind(&phone_number)
            .bind(&record.assistant_id)
            .bind(Utc::now())
            .bind(REGION)
            .execute(pool)
            .await;

        match result {
            Ok(_) => {
                log::info!(
                    "[Stats] Initial tb_stat row created - call {}, interaction {}, phone {}, stream {}",
                    record.call_id,
                    interaction_id,
                    phone_number,
                    record.stream_sid
                );
                true
            }
            Err(e) => {
                log::error!("[Stats] Insert failed for call {}: {}", record.call_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_writer_reports_failure_without_connecting() {
        let writer = StatsWriter::disabled();
        let ok = writer
            .record_call_start(NewCallRecord {
                call_id: "c1".into(),
                assistant_id: "a1".into(),
                interaction_id: String::new(),
                phone_number: String::new(),
                stream_sid: "MZ1".into(),
            })
            .await;
        assert!(!ok);
        // The attempt is still counted: one start event, one attempt.
        assert_eq!(writer.attempt_count(), 1);
    }
}

// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, InsertOutcome, PaymentRejection, PendingBooking, PendingStatus,
    RejectionOutcome, SlotKey,
};
use crate::services::store::AppointmentStore;

#[derive(Debug, Deserialize)]
struct AppointmentRecordRow {
    record: Appointment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BookingStatus {
    Inserted,
    Duplicate,
    Full,
    Rejected,
}

/// Result of the `book_appointment_slot` function.
#[derive(Debug, Deserialize)]
struct BookingResult {
    status: BookingStatus,
    booked: Option<u32>,
    appointment: Option<Appointment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RejectStatus {
    Recorded,
    Rejected,
    Booked,
}

/// Result of the `reject_payment` function.
#[derive(Debug, Deserialize)]
struct RejectResult {
    status: RejectStatus,
    appointment: Option<Appointment>,
}

/// PostgREST-backed store. `book_appointment_slot` and `reject_payment` take a
/// transaction-scoped advisory lock on the payment, and booking also locks the
/// window, so counting, inserting and rejecting cannot interleave across API
/// instances. Unique `(order_id, payment_id)` keys back both tables.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            service_key: config.storage_key().to_string(),
        }
    }
}

fn dependency(error: anyhow::Error) -> AppointmentError {
    error!("Appointment store request failed: {}", error);
    AppointmentError::Dependency(error.to_string())
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn count_booked(&self, key: &SlotKey) -> Result<u32, AppointmentError> {
        let params = json!({
            "p_doctor_id": key.doctor_id,
            "p_clinic_id": key.clinic_id,
            "p_appointment_date": key.appointment_date,
            "p_time_from": key.time_from,
            "p_time_to": key.time_to,
        });

        self.supabase
            .rpc("count_booked_appointments", Some(&self.service_key), params)
            .await
            .map_err(dependency)
    }

    async fn insert_within_capacity(
        &self,
        appointment: Appointment,
        max_slots: u32,
    ) -> Result<InsertOutcome, AppointmentError> {
        let params = json!({
            "p_appointment": appointment,
            "p_max_slots": max_slots,
        });

        let result: BookingResult = self
            .supabase
            .rpc("book_appointment_slot", Some(&self.service_key), params)
            .await
            .map_err(dependency)?;
        debug!("book_appointment_slot for order {}: {:?}", appointment.order_id, result.status);

        match result.status {
            BookingStatus::Inserted => Ok(InsertOutcome::Inserted(result.appointment.unwrap_or(appointment))),
            BookingStatus::Duplicate => Ok(InsertOutcome::Duplicate(result.appointment.unwrap_or(appointment))),
            BookingStatus::Full => Ok(InsertOutcome::SlotFull {
                booked: result.booked.unwrap_or(max_slots),
            }),
            BookingStatus::Rejected => Ok(InsertOutcome::AlreadyRejected),
        }
    }

    async fn find_by_payment(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?order_id=eq.{}&payment_id=eq.{}&select=record",
            urlencoding::encode(order_id),
            urlencoding::encode(payment_id)
        );

        let rows: Vec<AppointmentRecordRow> = self
            .supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await
            .map_err(dependency)?;

        Ok(rows.into_iter().next().map(|row| row.record))
    }

    async fn find_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<PaymentRejection>, AppointmentError> {
        let path = format!(
            "/rest/v1/payment_rejections?order_id=eq.{}&payment_id=eq.{}",
            urlencoding::encode(order_id),
            urlencoding::encode(payment_id)
        );

        let rows: Vec<PaymentRejection> = self
            .supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await
            .map_err(dependency)?;

        Ok(rows.into_iter().next())
    }

    async fn record_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
        reason: &str,
    ) -> Result<RejectionOutcome, AppointmentError> {
        let params = json!({
            "p_order_id": order_id,
            "p_payment_id": payment_id,
            "p_reason": reason,
        });

        let result: RejectResult = self
            .supabase
            .rpc("reject_payment", Some(&self.service_key), params)
            .await
            .map_err(dependency)?;
        debug!("reject_payment for order {}: {:?}", order_id, result.status);

        match (result.status, result.appointment) {
            (RejectStatus::Recorded, _) => Ok(RejectionOutcome::Recorded),
            (RejectStatus::Rejected, _) => Ok(RejectionOutcome::AlreadyRejected),
            (RejectStatus::Booked, Some(appointment)) => Ok(RejectionOutcome::Booked(appointment)),
            (RejectStatus::Booked, None) => Err(AppointmentError::Dependency(
                "reject_payment reported a booking without returning it".to_string(),
            )),
        }
    }

    async fn save_pending(&self, pending: &PendingBooking) -> Result<(), AppointmentError> {
        let body = serde_json::to_value(pending)
            .map_err(|e| AppointmentError::Dependency(e.to_string()))?;

        let _: Value = self
            .supabase
            .request(Method::POST, "/rest/v1/pending_bookings", Some(&self.service_key), Some(body))
            .await
            .map_err(dependency)?;

        debug!("Saved pending booking for order {}", pending.order_id);
        Ok(())
    }

    async fn get_pending(&self, order_id: &str) -> Result<Option<PendingBooking>, AppointmentError> {
        let path = format!(
            "/rest/v1/pending_bookings?order_id=eq.{}",
            urlencoding::encode(order_id)
        );

        let rows: Vec<PendingBooking> = self
            .supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await
            .map_err(dependency)?;

        Ok(rows.into_iter().next())
    }

    async fn update_pending_status(
        &self,
        order_id: &str,
        status: PendingStatus,
        payment_id: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/pending_bookings?order_id=eq.{}",
            urlencoding::encode(order_id)
        );

        let mut body = json!({ "status": status });
        if let Some(payment_id) = payment_id {
            body["payment_id"] = json!(payment_id);
        }

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.service_key),
                Some(body),
                Some(SupabaseClient::representation_headers()),
            )
            .await
            .map_err(dependency)?;

        if rows.is_empty() {
            warn!("No pending booking to update for order {}", order_id);
            return Err(AppointmentError::NotFound(format!("Pending booking {} not found", order_id)));
        }

        Ok(())
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, AppointmentError> {
        self.supabase
            .rpc("expire_pending_bookings", Some(&self.service_key), json!({ "p_now": now }))
            .await
            .map_err(dependency)
    }
}

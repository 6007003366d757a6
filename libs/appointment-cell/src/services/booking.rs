// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use doctor_cell::services::ScheduleService;
use payment_cell::models::CreateOrderRequest;
use payment_cell::services::PaymentGateway;

use crate::models::{
    AppointmentError, BookingIntentRequest, BookingMetadata, OrderIssued, PendingBooking,
    PendingStatus, SlotAvailability, SlotAvailabilityQuery, SlotKey,
};
use crate::services::capacity::SlotCapacityCounter;
use crate::services::commission::CommissionSource;
use crate::services::store::AppointmentStore;

/// Gateway receipts are limited to 40 characters.
const MAX_RECEIPT_LENGTH: usize = 40;

pub struct BookingService {
    schedules: Arc<ScheduleService>,
    store: Arc<dyn AppointmentStore>,
    capacity: SlotCapacityCounter,
    gateway: Arc<dyn PaymentGateway>,
    commission: Arc<dyn CommissionSource>,
    currency: String,
    pending_ttl: chrono::Duration,
    call_timeout: Duration,
}

impl BookingService {
    pub fn new(
        schedules: Arc<ScheduleService>,
        store: Arc<dyn AppointmentStore>,
        gateway: Arc<dyn PaymentGateway>,
        commission: Arc<dyn CommissionSource>,
    ) -> Self {
        Self {
            capacity: SlotCapacityCounter::new(Arc::clone(&store)),
            schedules,
            store,
            gateway,
            commission,
            currency: "INR".to_string(),
            pending_ttl: chrono::Duration::minutes(30),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_pending_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Upper bound on each gateway call; the intent fails closed on expiry.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Validate the request, capacity-check the stored window, and open a
    /// gateway order carrying the booking metadata.
    pub async fn issue_order(
        &self,
        user_id: &str,
        request: BookingIntentRequest,
    ) -> Result<OrderIssued, AppointmentError> {
        let intent = request.validate()?;
        debug!(
            "Booking intent from {} for doctor {} at clinic {} on {}",
            user_id, intent.doctor_id, intent.clinic_id, intent.appointment_date
        );

        let resolved = self
            .schedules
            .resolve_slot(intent.doctor_id, intent.clinic_id, intent.schedule_entry_id)
            .await?;

        let key = SlotKey::for_slot(intent.doctor_id, intent.clinic_id, &intent.appointment_date, &resolved.slot);
        if let Err(e) = self.capacity.ensure_available(&key, resolved.slot.max_slots).await {
            warn!(
                "Slot {} on {} is full for doctor {}",
                resolved.slot.id, intent.appointment_date, intent.doctor_id
            );
            return Err(e);
        }

        let commission = self.commission.current().await?;
        let amount = commission.platform_fee_minor_units();
        let metadata = BookingMetadata::new(user_id, &intent, &resolved.slot);

        let order_request = CreateOrderRequest {
            amount,
            currency: self.currency.clone(),
            receipt: receipt_for(user_id),
            payment_capture: true,
            notes: metadata.to_notes(),
        };

        let order = timeout(self.call_timeout, self.gateway.create_order(&order_request))
            .await
            .map_err(|_| {
                error!("Payment gateway did not answer within {:?}", self.call_timeout);
                AppointmentError::Dependency("Payment gateway timed out".to_string())
            })??;

        let now = Utc::now();
        let pending = PendingBooking {
            order_id: order.id.clone(),
            schedule_entry_id: resolved.slot.id,
            metadata,
            amount_minor_units: order.amount,
            currency: order.currency.clone(),
            status: PendingStatus::Pending,
            payment_id: None,
            created_at: now,
            expires_at: now + self.pending_ttl,
        };
        self.store.save_pending(&pending).await?;

        info!("Order {} issued for user {} ({} {})", order.id, user_id, order.amount, order.currency);

        Ok(OrderIssued {
            order_id: order.id,
            amount_minor_units: order.amount,
            currency: order.currency,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Advisory capacity read for one schedule window on one date.
    pub async fn slot_availability(
        &self,
        query: SlotAvailabilityQuery,
    ) -> Result<SlotAvailability, AppointmentError> {
        let (Some(doctor_id), Some(clinic_id), Some(schedule_entry_id), Some(appointment_date)) = (
            query.doctor_id.as_deref(),
            query.clinic_id.as_deref(),
            query.schedule_entry_id.as_deref(),
            query.appointment_date.as_deref(),
        ) else {
            return Err(AppointmentError::Validation(
                "Doctor Id, Clinic Id, Scheduled Id, and Appointment Date are required.".to_string(),
            ));
        };

        crate::models::validate_appointment_date(appointment_date)?;
        let invalid_id = || AppointmentError::Validation("Invalid identifier.".to_string());
        let doctor_id: Uuid = doctor_id.parse().map_err(|_| invalid_id())?;
        let clinic_id: Uuid = clinic_id.parse().map_err(|_| invalid_id())?;
        let schedule_entry_id: Uuid = schedule_entry_id.parse().map_err(|_| invalid_id())?;

        let resolved = self
            .schedules
            .resolve_slot(doctor_id, clinic_id, schedule_entry_id)
            .await?;

        let key = SlotKey::for_slot(doctor_id, clinic_id, appointment_date, &resolved.slot);
        let booked_slot = self.capacity.count_booked(&key).await?;

        Ok(SlotAvailability {
            schedule_entry_id,
            clinic_id,
            doctor_id,
            max_slots: resolved.slot.max_slots,
            booked_slot,
        })
    }

    pub async fn expire_pending_bookings(&self, now: DateTime<Utc>) -> Result<u64, AppointmentError> {
        self.store.expire_pending(now).await
    }
}

/// `rcpt_` plus the user id without dashes, cut to the gateway's limit.
pub fn receipt_for(user_id: &str) -> String {
    let mut receipt = format!("rcpt_{}", user_id.replace('-', ""));
    if let Some((cut, _)) = receipt.char_indices().nth(MAX_RECEIPT_LENGTH) {
        receipt.truncate(cut);
    }
    receipt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_fits_gateway_limit() {
        let receipt = receipt_for("3f2b8c1e-9d4a-4e6b-8a7c-1b2d3e4f5a6b");
        assert_eq!(receipt, "rcpt_3f2b8c1e9d4a4e6b8a7c1b2d3e4f5a6b");

        let long = receipt_for(&"x".repeat(64));
        assert_eq!(long.len(), MAX_RECEIPT_LENGTH);

        assert_eq!(receipt_for("u1"), "rcpt_u1");
    }
}

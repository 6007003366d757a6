// libs/appointment-cell/src/services/confirmation.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use doctor_cell::models::{Clinic, DaySlot, Doctor};
use doctor_cell::services::ScheduleService;
use payment_cell::models::{GatewayRefund, PaymentEntity, RefundRequest, WebhookEvent};
use payment_cell::services::{verify_signature, PaymentGateway};

use crate::models::{
    Appointment, AppointmentError, AppointmentSnapshot, BookingMetadata, InsertOutcome,
    PaymentStatus, PendingStatus, RejectionOutcome, WebhookOutcome, SLOT_FULL_MESSAGE,
};
use crate::services::commission::CommissionSource;
use crate::services::store::AppointmentStore;

/// Turns verified `payment.captured` callbacks into appointments.
pub struct ConfirmationService {
    schedules: Arc<ScheduleService>,
    store: Arc<dyn AppointmentStore>,
    gateway: Arc<dyn PaymentGateway>,
    commission: Arc<dyn CommissionSource>,
    webhook_secret: String,
    call_timeout: Duration,
}

impl ConfirmationService {
    pub fn new(
        schedules: Arc<ScheduleService>,
        store: Arc<dyn AppointmentStore>,
        gateway: Arc<dyn PaymentGateway>,
        commission: Arc<dyn CommissionSource>,
        webhook_secret: &str,
    ) -> Self {
        Self {
            schedules,
            store,
            gateway,
            commission,
            webhook_secret: webhook_secret.to_string(),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Process one delivery. Never fails: every problem is logged and folded
    /// into the returned outcome so the gateway can always be answered 200.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> WebhookOutcome {
        let Some(signature) = signature else {
            warn!("Webhook without signature header discarded");
            return WebhookOutcome::Discarded { reason: "Missing signature".to_string() };
        };

        if let Err(e) = verify_signature(body, signature, &self.webhook_secret) {
            warn!("Webhook discarded: {}", e);
            return WebhookOutcome::Discarded { reason: AppointmentError::from(e).to_string() };
        }

        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!("Signed webhook body is not a gateway event: {}", e);
                return WebhookOutcome::Discarded { reason: e.to_string() };
            }
        };

        if !event.is_payment_captured() {
            debug!("Ignoring webhook event {}", event.event);
            return WebhookOutcome::Ignored { event: event.event };
        }

        let Some((payment, order_id)) = event
            .payment()
            .and_then(|payment| payment.order_id.as_deref().map(|order_id| (payment, order_id)))
        else {
            warn!("payment.captured event without an order reference");
            return WebhookOutcome::Discarded { reason: "Payment has no order".to_string() };
        };

        match self.confirm(order_id, payment).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to confirm payment {} for order {}: {}", payment.id, order_id, e);
                WebhookOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn confirm(
        &self,
        order_id: &str,
        payment: &PaymentEntity,
    ) -> Result<WebhookOutcome, AppointmentError> {
        if let Some(existing) = self.store.find_by_payment(order_id, &payment.id).await? {
            info!("Duplicate delivery for order {} payment {}", order_id, payment.id);
            return Ok(WebhookOutcome::Duplicate { appointment_id: existing.id });
        }

        if let Some(rejection) = self.store.find_rejection(order_id, &payment.id).await? {
            info!(
                "Payment {} for order {} was already rejected ({})",
                payment.id, order_id, rejection.reason
            );
            return Ok(already_rejected(payment));
        }

        let (metadata, schedule_entry_id) = match self.store.get_pending(order_id).await? {
            Some(pending) => {
                if pending.amount_minor_units != payment.amount {
                    warn!(
                        "Order {} was issued for {} but payment {} captured {}",
                        order_id, pending.amount_minor_units, payment.id, payment.amount
                    );
                }
                (pending.metadata, Some(pending.schedule_entry_id))
            }
            None => {
                warn!("No pending booking for order {}, reading payment notes", order_id);
                (BookingMetadata::from_notes(&payment.notes)?, None)
            }
        };

        let (doctor, clinic, slot) = match self.current_window(&metadata, schedule_entry_id).await {
            Ok(found) => found,
            Err(AppointmentError::NotFound(reason)) => {
                return match self.store.record_rejection(order_id, &payment.id, &reason).await? {
                    RejectionOutcome::Recorded => Ok(self.reject(order_id, payment, reason).await),
                    RejectionOutcome::AlreadyRejected => Ok(already_rejected(payment)),
                    RejectionOutcome::Booked(existing) => {
                        Ok(WebhookOutcome::Duplicate { appointment_id: existing.id })
                    }
                };
            }
            Err(e) => return Err(e),
        };

        let commission = self.commission.current().await?;
        let total_amount = payment.amount as f64 / 100.0;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            created_by: metadata.user_id,
            doctor_id: doctor.id,
            clinic_id: clinic.id,
            snapshot: AppointmentSnapshot {
                doctor_fee: doctor.fee_for(clinic.id),
                doctor_name: doctor.full_name,
                specialization: doctor.specialization,
                clinic_address: clinic.full_address(),
                clinic_name: clinic.name,
                clinic_number: clinic.phone_number,
            },
            full_name: metadata.full_name,
            phone_number: metadata.phone_number,
            age: metadata.age,
            gender: metadata.gender,
            appointment_day: slot.day,
            appointment_date: metadata.appointment_date,
            appointment_time_from: slot.start_time,
            appointment_time_to: slot.end_time,
            health_insured: metadata.health_insured,
            terms_accepted: metadata.terms_accepted,
            billing_address: metadata.billing_address,
            payment_status: PaymentStatus::Paid,
            payment_method: payment
                .method
                .clone()
                .filter(|method| !method.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            payment_id: payment.id.clone(),
            order_id: order_id.to_string(),
            amount_paid: total_amount,
            total_amount,
            booking_commission: commission.booking_commission(total_amount),
            created_at: Utc::now(),
        };

        match self.store.insert_within_capacity(appointment, slot.max_slots).await? {
            InsertOutcome::Inserted(appointment) => {
                self.mark_pending(order_id, PendingStatus::Confirmed, &payment.id).await;
                info!(
                    "Appointment {} confirmed for order {} ({} {}-{})",
                    appointment.id,
                    order_id,
                    appointment.appointment_date,
                    appointment.appointment_time_from,
                    appointment.appointment_time_to
                );
                Ok(WebhookOutcome::Confirmed { appointment_id: appointment.id })
            }
            InsertOutcome::Duplicate(existing) => {
                info!("Order {} payment {} was confirmed concurrently", order_id, payment.id);
                Ok(WebhookOutcome::Duplicate { appointment_id: existing.id })
            }
            InsertOutcome::SlotFull { booked } => {
                warn!(
                    "Slot filled ({} of {}) before payment {} for order {} was confirmed",
                    booked, slot.max_slots, payment.id, order_id
                );
                Ok(self.reject(order_id, payment, SLOT_FULL_MESSAGE.to_string()).await)
            }
            InsertOutcome::AlreadyRejected => {
                info!("Order {} payment {} was rejected concurrently", order_id, payment.id);
                Ok(already_rejected(payment))
            }
        }
    }

    /// Fresh doctor, clinic and the window being booked. The window must still
    /// exist with the same day and times it had when the order was issued.
    async fn current_window(
        &self,
        metadata: &BookingMetadata,
        schedule_entry_id: Option<Uuid>,
    ) -> Result<(Doctor, Clinic, DaySlot), AppointmentError> {
        let (doctor, clinic) = self
            .schedules
            .doctor_at_clinic(metadata.doctor_id, metadata.clinic_id)
            .await?;

        let same_window = |slot: &&DaySlot| {
            slot.day == metadata.appointment_day
                && slot.start_time == metadata.appointment_time_from
                && slot.end_time == metadata.appointment_time_to
        };

        let slot = {
            let schedule = doctor
                .schedule_for(clinic.id)
                .map(|entry| entry.schedule.as_slice())
                .unwrap_or_default();

            schedule_entry_id
                .and_then(|id| schedule.iter().filter(same_window).find(|slot| slot.id == id))
                .or_else(|| schedule.iter().find(same_window))
                .cloned()
        };

        let slot = slot.ok_or_else(|| {
            AppointmentError::NotFound("Appointment schedule not found.".to_string())
        })?;

        Ok((doctor, clinic, slot))
    }

    /// Refund a payment whose rejection this delivery recorded. Runs at most
    /// once per `(orderId, paymentId)`.
    async fn reject(&self, order_id: &str, payment: &PaymentEntity, reason: String) -> WebhookOutcome {
        warn!("Rejecting payment {} for order {}: {}", payment.id, order_id, reason);

        let refund_id = match self.refund(order_id, payment, &reason).await {
            Ok(refund) => Some(refund.id),
            Err(e) => {
                error!("Refund for payment {} failed: {}", payment.id, e);
                None
            }
        };

        self.mark_pending(order_id, PendingStatus::Rejected, &payment.id).await;
        WebhookOutcome::Rejected { reason, refund_id }
    }

    async fn refund(
        &self,
        order_id: &str,
        payment: &PaymentEntity,
        reason: &str,
    ) -> Result<GatewayRefund, AppointmentError> {
        let mut notes = Map::new();
        notes.insert("orderId".to_string(), Value::from(order_id));
        notes.insert("reason".to_string(), Value::from(reason));

        let request = RefundRequest { amount: None, notes };
        let refund = timeout(self.call_timeout, self.gateway.refund_payment(&payment.id, &request))
            .await
            .map_err(|_| AppointmentError::Dependency("Payment gateway timed out".to_string()))??;

        Ok(refund)
    }

    async fn mark_pending(&self, order_id: &str, status: PendingStatus, payment_id: &str) {
        match self.store.update_pending_status(order_id, status, Some(payment_id)).await {
            Ok(()) => debug!("Pending booking for order {} is now {}", order_id, status),
            Err(AppointmentError::NotFound(_)) => {
                debug!("No pending booking recorded for order {}", order_id)
            }
            Err(e) => warn!("Could not mark order {} as {}: {}", order_id, status, e),
        }
    }
}

fn already_rejected(payment: &PaymentEntity) -> WebhookOutcome {
    WebhookOutcome::AlreadyRejected { payment_id: payment.id.clone() }
}

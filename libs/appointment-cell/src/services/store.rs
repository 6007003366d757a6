// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{
    Appointment, AppointmentError, InsertOutcome, PaymentRejection, PendingBooking, PendingStatus,
    RejectionOutcome, SlotKey, SLOT_FULL_MESSAGE,
};

/// Appointment and pending-booking persistence.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn count_booked(&self, key: &SlotKey) -> Result<u32, AppointmentError>;

    /// Insert `appointment` only if `(orderId, paymentId)` is neither booked nor
    /// rejected and fewer than `max_slots` appointments exist for its window.
    /// A full window records the payment as rejected. All of it is one atomic
    /// step.
    async fn insert_within_capacity(
        &self,
        appointment: Appointment,
        max_slots: u32,
    ) -> Result<InsertOutcome, AppointmentError>;

    async fn find_by_payment(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn find_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<PaymentRejection>, AppointmentError>;

    /// Record `(orderId, paymentId)` as rejected unless it is already rejected
    /// or booked. Atomic with `insert_within_capacity`.
    async fn record_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
        reason: &str,
    ) -> Result<RejectionOutcome, AppointmentError>;

    async fn save_pending(&self, pending: &PendingBooking) -> Result<(), AppointmentError>;

    async fn get_pending(&self, order_id: &str) -> Result<Option<PendingBooking>, AppointmentError>;

    async fn update_pending_status(
        &self,
        order_id: &str,
        status: PendingStatus,
        payment_id: Option<&str>,
    ) -> Result<(), AppointmentError>;

    /// Mark every still-pending booking that expired before `now`; returns how many.
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, AppointmentError>;
}

#[derive(Default)]
struct Tables {
    appointments: Vec<Appointment>,
    rejections: Vec<PaymentRejection>,
    pending: HashMap<String, PendingBooking>,
}

impl Tables {
    fn booked(&self, order_id: &str, payment_id: &str) -> Option<&Appointment> {
        self.appointments
            .iter()
            .find(|appointment| appointment.same_payment(order_id, payment_id))
    }

    fn rejected(&self, order_id: &str, payment_id: &str) -> Option<&PaymentRejection> {
        self.rejections
            .iter()
            .find(|rejection| rejection.order_id == order_id && rejection.payment_id == payment_id)
    }

    fn reject(&mut self, order_id: &str, payment_id: &str, reason: &str) {
        self.rejections.push(PaymentRejection {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            reason: reason.to_string(),
            rejected_at: Utc::now(),
        });
    }
}

/// Process-local store. A single mutex over all tables gives the
/// count-then-insert step the same atomicity the database function has.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    tables: Mutex<Tables>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.tables.lock().await.appointments.clone()
    }

    /// Seed an appointment as-is, bypassing capacity checks.
    pub async fn insert_appointment(&self, appointment: Appointment) {
        self.tables.lock().await.appointments.push(appointment);
    }
}

fn booked_in(appointments: &[Appointment], key: &SlotKey) -> u32 {
    appointments
        .iter()
        .filter(|appointment| appointment.slot_key() == *key)
        .count() as u32
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn count_booked(&self, key: &SlotKey) -> Result<u32, AppointmentError> {
        Ok(booked_in(&self.tables.lock().await.appointments, key))
    }

    async fn insert_within_capacity(
        &self,
        appointment: Appointment,
        max_slots: u32,
    ) -> Result<InsertOutcome, AppointmentError> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.booked(&appointment.order_id, &appointment.payment_id) {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }
        if tables.rejected(&appointment.order_id, &appointment.payment_id).is_some() {
            return Ok(InsertOutcome::AlreadyRejected);
        }

        let booked = booked_in(&tables.appointments, &appointment.slot_key());
        if booked >= max_slots {
            tables.reject(&appointment.order_id, &appointment.payment_id, SLOT_FULL_MESSAGE);
            return Ok(InsertOutcome::SlotFull { booked });
        }

        tables.appointments.push(appointment.clone());
        Ok(InsertOutcome::Inserted(appointment))
    }

    async fn find_by_payment(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.tables.lock().await.booked(order_id, payment_id).cloned())
    }

    async fn find_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<PaymentRejection>, AppointmentError> {
        Ok(self.tables.lock().await.rejected(order_id, payment_id).cloned())
    }

    async fn record_rejection(
        &self,
        order_id: &str,
        payment_id: &str,
        reason: &str,
    ) -> Result<RejectionOutcome, AppointmentError> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.booked(order_id, payment_id) {
            return Ok(RejectionOutcome::Booked(existing.clone()));
        }
        if tables.rejected(order_id, payment_id).is_some() {
            return Ok(RejectionOutcome::AlreadyRejected);
        }

        tables.reject(order_id, payment_id, reason);
        Ok(RejectionOutcome::Recorded)
    }

    async fn save_pending(&self, pending: &PendingBooking) -> Result<(), AppointmentError> {
        self.tables
            .lock()
            .await
            .pending
            .insert(pending.order_id.clone(), pending.clone());
        Ok(())
    }

    async fn get_pending(&self, order_id: &str) -> Result<Option<PendingBooking>, AppointmentError> {
        Ok(self.tables.lock().await.pending.get(order_id).cloned())
    }

    async fn update_pending_status(
        &self,
        order_id: &str,
        status: PendingStatus,
        payment_id: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let mut tables = self.tables.lock().await;
        let pending = tables
            .pending
            .get_mut(order_id)
            .ok_or_else(|| AppointmentError::NotFound(format!("Pending booking {} not found", order_id)))?;

        pending.status = status;
        if let Some(payment_id) = payment_id {
            pending.payment_id = Some(payment_id.to_string());
        }
        Ok(())
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<u64, AppointmentError> {
        let mut tables = self.tables.lock().await;
        let mut expired = 0;

        for pending in tables.pending.values_mut() {
            if pending.status == PendingStatus::Pending && pending.expires_at <= now {
                pending.status = PendingStatus::Expired;
                expired += 1;
            }
        }

        if expired > 0 {
            info!("Expired {} pending bookings", expired);
        }
        Ok(expired)
    }
}

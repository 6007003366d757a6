// libs/appointment-cell/src/services/capacity.rs
use std::sync::Arc;

use tracing::debug;

use crate::models::{AppointmentError, SlotKey};
use crate::services::store::AppointmentStore;

pub fn is_available(booked: u32, max_slots: u32) -> bool {
    booked < max_slots
}

/// Counts confirmed appointments for one exact window. The count is advisory
/// here; the authoritative check happens inside
/// `AppointmentStore::insert_within_capacity`.
pub struct SlotCapacityCounter {
    store: Arc<dyn AppointmentStore>,
}

impl SlotCapacityCounter {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn count_booked(&self, key: &SlotKey) -> Result<u32, AppointmentError> {
        let booked = self.store.count_booked(key).await?;
        debug!(
            "Slot {} {}-{} for doctor {} at clinic {}: {} booked",
            key.appointment_date, key.time_from, key.time_to, key.doctor_id, key.clinic_id, booked
        );
        Ok(booked)
    }

    /// Booked count, or `SlotFull` when no capacity remains.
    pub async fn ensure_available(&self, key: &SlotKey, max_slots: u32) -> Result<u32, AppointmentError> {
        let booked = self.count_booked(key).await?;

        if is_available(booked, max_slots) {
            Ok(booked)
        } else {
            Err(AppointmentError::SlotFull)
        }
    }
}

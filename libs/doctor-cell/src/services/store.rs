// libs/doctor-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Clinic, Doctor, ScheduleError};

/// Persistence for the doctor aggregate (profile, affiliations, fees, schedules)
/// and read access to clinics.
///
/// `save_doctor` and `delete_doctor` are optimistic: they succeed only when the
/// stored version still equals `doctor.version`, and fail with
/// `ScheduleError::ConcurrentModification` otherwise.
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError>;

    async fn find_by_registration_number(
        &self,
        registration_number: &str,
    ) -> Result<Option<Doctor>, ScheduleError>;

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, ScheduleError>;

    async fn create_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError>;

    /// Returns the stored doctor with its bumped version.
    async fn save_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError>;

    async fn delete_doctor(&self, doctor_id: Uuid, expected_version: i64) -> Result<(), ScheduleError>;
}

/// Process-local store, used by tests and by the API when Supabase is not configured.
#[derive(Default)]
pub struct InMemoryDoctorStore {
    doctors: RwLock<HashMap<Uuid, Doctor>>,
    clinics: RwLock<HashMap<Uuid, Clinic>>,
}

impl InMemoryDoctorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_clinic(&self, clinic: Clinic) {
        self.clinics.write().await.insert(clinic.id, clinic);
    }

    /// Seed a doctor as-is, bypassing version checks.
    pub async fn insert_doctor(&self, doctor: Doctor) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }

    pub async fn doctor_count(&self) -> usize {
        self.doctors.read().await.len()
    }
}

#[async_trait]
impl DoctorStore for InMemoryDoctorStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }

    async fn find_by_registration_number(
        &self,
        registration_number: &str,
    ) -> Result<Option<Doctor>, ScheduleError> {
        Ok(self
            .doctors
            .read()
            .await
            .values()
            .find(|doctor| doctor.registration_number == registration_number)
            .cloned())
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, ScheduleError> {
        Ok(self.clinics.read().await.get(&clinic_id).cloned())
    }

    async fn create_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError> {
        let mut doctors = self.doctors.write().await;

        if doctors.contains_key(&doctor.id)
            || doctors
                .values()
                .any(|existing| existing.registration_number == doctor.registration_number)
        {
            return Err(ScheduleError::ConcurrentModification(doctor.id));
        }

        let mut stored = doctor.clone();
        stored.version = 1;
        doctors.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError> {
        let mut doctors = self.doctors.write().await;

        let current = doctors
            .get(&doctor.id)
            .ok_or_else(|| ScheduleError::NotFound("Doctor not found.".to_string()))?;

        if current.version != doctor.version {
            return Err(ScheduleError::ConcurrentModification(doctor.id));
        }

        let mut stored = doctor.clone();
        stored.version += 1;
        doctors.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_doctor(&self, doctor_id: Uuid, expected_version: i64) -> Result<(), ScheduleError> {
        let mut doctors = self.doctors.write().await;

        match doctors.get(&doctor_id) {
            None => Err(ScheduleError::NotFound("Doctor not found.".to_string())),
            Some(current) if current.version != expected_version => {
                Err(ScheduleError::ConcurrentModification(doctor_id))
            }
            Some(_) => {
                doctors.remove(&doctor_id);
                Ok(())
            }
        }
    }
}

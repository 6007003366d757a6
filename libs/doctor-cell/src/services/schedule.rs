// libs/doctor-cell/src/services/schedule.rs
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AffiliateDoctorRequest, AffiliationOutcome, Clinic, ClinicFee, ClinicScheduleResponse, DaySlot,
    DaySlotRequest, Doctor, DoctorScheduleEntry, ProposedSlot, RemovalOutcome, ScheduleError,
    SetScheduleRequest,
};
use crate::services::conflict::ensure_no_cross_clinic_conflict;
use crate::services::lock::DoctorLockManager;
use crate::services::store::DoctorStore;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{0,3}\d{10}$").expect("valid phone pattern"));

/// A doctor, the clinic they practise at, and one resolved window of that
/// clinic's schedule.
#[derive(Debug, Clone)]
pub struct ResolvedSlot {
    pub doctor: Doctor,
    pub clinic: Clinic,
    pub slot: DaySlot,
}

pub struct ScheduleService {
    store: Arc<dyn DoctorStore>,
    locks: Arc<dyn DoctorLockManager>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn DoctorStore>, locks: Arc<dyn DoctorLockManager>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> Arc<dyn DoctorStore> {
        Arc::clone(&self.store)
    }

    /// Replace the doctor's weekly schedule at `request.clinic_id`.
    pub async fn set_schedule(
        &self,
        doctor_id: Uuid,
        request: SetScheduleRequest,
    ) -> Result<Option<DoctorScheduleEntry>, ScheduleError> {
        debug!("Setting schedule for doctor {} at clinic {}", doctor_id, request.clinic_id);

        let proposed = validate_slots(&request.schedule)?;
        let clinic_id = request.clinic_id;

        self.with_doctor_lock(doctor_id, move || async move {
            let mut doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;
            ensure_no_cross_clinic_conflict(&doctor, clinic_id, &proposed)?;

            let current = doctor.schedule_for(clinic_id).map(|entry| entry.schedule.as_slice());
            let schedule = assign_slot_ids(&proposed, current.unwrap_or_default());
            replace_clinic_schedule(&mut doctor, clinic_id, schedule);

            let saved = self.store.save_doctor(&doctor).await?;
            info!("Schedule updated for doctor {} at clinic {}", doctor_id, clinic_id);
            Ok(saved.schedule_for(clinic_id).cloned())
        })
        .await
    }

    /// Remove one window from the doctor's schedule at `clinic_id`.
    pub async fn delete_day_slot(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
        slot_id: Uuid,
    ) -> Result<Vec<DoctorScheduleEntry>, ScheduleError> {
        self.with_doctor_lock(doctor_id, move || async move {
            let mut doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;

            let entry = doctor
                .appointments_schedule
                .iter_mut()
                .find(|entry| entry.clinic_id == clinic_id)
                .ok_or_else(|| ScheduleError::NotFound("Clinic schedule not found.".to_string()))?;

            let index = entry
                .schedule
                .iter()
                .position(|slot| slot.id == slot_id)
                .ok_or_else(|| ScheduleError::NotFound("Appointment schedule not found.".to_string()))?;

            entry.schedule.remove(index);
            doctor.appointments_schedule.retain(|entry| !entry.schedule.is_empty());

            let saved = self.store.save_doctor(&doctor).await?;
            info!("Removed slot {} for doctor {} at clinic {}", slot_id, doctor_id, clinic_id);
            Ok(saved.appointments_schedule)
        })
        .await
    }

    /// Add a doctor to `clinic_id`, creating the doctor when the registration
    /// number is unknown.
    pub async fn affiliate_doctor(
        &self,
        clinic_id: Uuid,
        request: AffiliateDoctorRequest,
    ) -> Result<(Doctor, AffiliationOutcome), ScheduleError> {
        let profile = validate_affiliation(&request)?;
        let proposed = match &request.schedule {
            Some(slots) => validate_slots(slots)?,
            None => Vec::new(),
        };

        self.store
            .get_clinic(clinic_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound("Clinic not found.".to_string()))?;

        let Some(existing) = self
            .store
            .find_by_registration_number(&profile.registration_number)
            .await?
        else {
            let schedule = assign_slot_ids(&proposed, &[]);
            let mut doctor = Doctor {
                id: Uuid::new_v4(),
                full_name: profile.full_name,
                email: Some(profile.email),
                specialization: profile.specialization,
                registration_number: profile.registration_number,
                phone_number: profile.phone_number,
                clinics: vec![clinic_id],
                fees: vec![ClinicFee { clinic_id, fee: profile.fee }],
                appointments_schedule: Vec::new(),
                version: 0,
            };
            replace_clinic_schedule(&mut doctor, clinic_id, schedule);

            let created = self.store.create_doctor(&doctor).await?;
            info!("Created doctor {} at clinic {}", created.id, clinic_id);
            return Ok((created, AffiliationOutcome::Created));
        };

        let doctor_id = existing.id;
        self.with_doctor_lock(doctor_id, move || async move {
            let mut doctor = self
                .store
                .get_doctor(doctor_id)
                .await?
                .ok_or_else(|| ScheduleError::NotFound("Doctor not found.".to_string()))?;

            if doctor.is_affiliated(clinic_id) {
                return Err(ScheduleError::Validation(
                    "Doctor already exists in this clinic.".to_string(),
                ));
            }

            ensure_no_cross_clinic_conflict(&doctor, clinic_id, &proposed)?;

            doctor.clinics.push(clinic_id);
            doctor.fees.retain(|fee| fee.clinic_id != clinic_id);
            doctor.fees.push(ClinicFee { clinic_id, fee: profile.fee });
            replace_clinic_schedule(&mut doctor, clinic_id, assign_slot_ids(&proposed, &[]));

            let saved = self.store.save_doctor(&doctor).await?;
            info!("Affiliated doctor {} with clinic {}", doctor_id, clinic_id);
            Ok((saved, AffiliationOutcome::Affiliated))
        })
        .await
    }

    /// Detach a doctor from `clinic_id`; the last detachment deletes the doctor.
    pub async fn remove_affiliation(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
    ) -> Result<RemovalOutcome, ScheduleError> {
        self.with_doctor_lock(doctor_id, move || async move {
            let mut doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;

            doctor.clinics.retain(|id| *id != clinic_id);
            doctor.fees.retain(|fee| fee.clinic_id != clinic_id);
            doctor.appointments_schedule.retain(|entry| entry.clinic_id != clinic_id);

            if doctor.clinics.is_empty() {
                self.store.delete_doctor(doctor_id, doctor.version).await?;
                info!("Deleted doctor {} after removing last clinic {}", doctor_id, clinic_id);
                return Ok(RemovalOutcome::Deleted);
            }

            self.store.save_doctor(&doctor).await?;
            info!("Detached doctor {} from clinic {}", doctor_id, clinic_id);
            Ok(RemovalOutcome::Detached)
        })
        .await
    }

    pub async fn set_clinic_fee(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
        fee: f64,
    ) -> Result<Doctor, ScheduleError> {
        if !fee.is_finite() || fee <= 0.0 {
            return Err(ScheduleError::Validation("Fee must be a positive number.".to_string()));
        }

        self.with_doctor_lock(doctor_id, move || async move {
            let mut doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;

            match doctor.fees.iter_mut().find(|entry| entry.clinic_id == clinic_id) {
                Some(entry) => entry.fee = fee,
                None => doctor.fees.push(ClinicFee { clinic_id, fee }),
            }

            self.store.save_doctor(&doctor).await
        })
        .await
    }

    pub async fn get_clinic_schedule(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
    ) -> Result<ClinicScheduleResponse, ScheduleError> {
        let doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;

        Ok(ClinicScheduleResponse {
            doctor_id,
            clinic_id,
            fee: doctor.fee_for(clinic_id),
            schedule: doctor
                .schedule_for(clinic_id)
                .map(|entry| entry.schedule.clone())
                .unwrap_or_default(),
        })
    }

    /// Resolve clinic, doctor-at-clinic and the named schedule window. The
    /// returned window is the stored one, never anything supplied by a caller.
    pub async fn resolve_slot(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
        slot_id: Uuid,
    ) -> Result<ResolvedSlot, ScheduleError> {
        let clinic = self
            .store
            .get_clinic(clinic_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound("Clinic not found.".to_string()))?;

        let doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;

        let entry = doctor
            .schedule_for(clinic_id)
            .ok_or_else(|| ScheduleError::NotFound("Clinic schedule not found.".to_string()))?;

        let slot = entry
            .schedule
            .iter()
            .find(|slot| slot.id == slot_id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound("Appointment schedule not found.".to_string()))?;

        Ok(ResolvedSlot { doctor, clinic, slot })
    }

    /// Fresh doctor + clinic pair; the doctor must still practise at the clinic.
    pub async fn doctor_at_clinic(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
    ) -> Result<(Doctor, Clinic), ScheduleError> {
        let clinic = self
            .store
            .get_clinic(clinic_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound("Clinic not found.".to_string()))?;

        let doctor = self.affiliated_doctor(doctor_id, clinic_id).await?;
        Ok((doctor, clinic))
    }

    async fn affiliated_doctor(&self, doctor_id: Uuid, clinic_id: Uuid) -> Result<Doctor, ScheduleError> {
        self.store
            .get_doctor(doctor_id)
            .await?
            .filter(|doctor| doctor.is_affiliated(clinic_id))
            .ok_or_else(|| ScheduleError::NotFound("Doctor not found.".to_string()))
    }

    async fn with_doctor_lock<T, F, Fut>(&self, doctor_id: Uuid, op: F) -> Result<T, ScheduleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ScheduleError>>,
    {
        let lease = self.locks.acquire(doctor_id).await?;
        let result = op().await;

        if let Err(e) = self.locks.release(lease).await {
            warn!("Failed to release schedule lock for doctor {}: {}", doctor_id, e);
        }

        result
    }
}

/// Validate every slot. Client-supplied ids must be unique within the write.
pub fn validate_slots(slots: &[DaySlotRequest]) -> Result<Vec<ProposedSlot>, ScheduleError> {
    let proposed: Vec<ProposedSlot> = slots
        .iter()
        .map(DaySlotRequest::validate)
        .collect::<Result<_, _>>()?;

    let mut seen = HashSet::new();
    if let Some(id) = proposed.iter().filter_map(|slot| slot.id).find(|id| !seen.insert(*id)) {
        return Err(ScheduleError::Validation(format!(
            "Schedule id {} is used by more than one slot.",
            id
        )));
    }

    Ok(proposed)
}

/// Give every proposed window an id: the caller's, else the id of an identical
/// stored window (so rewriting the same schedule is a no-op), else a new one.
fn assign_slot_ids(proposed: &[ProposedSlot], current: &[DaySlot]) -> Vec<DaySlot> {
    let mut taken: Vec<Uuid> = proposed.iter().filter_map(|slot| slot.id).collect();

    proposed
        .iter()
        .map(|slot| {
            let candidate = DaySlot {
                id: Uuid::nil(),
                day: slot.day,
                start_time: slot.start_time,
                end_time: slot.end_time,
                max_slots: slot.max_slots,
            };

            let id = slot.id.unwrap_or_else(|| {
                let reused = current
                    .iter()
                    .find(|existing| existing.same_window(&candidate) && !taken.contains(&existing.id))
                    .map(|existing| existing.id)
                    .unwrap_or_else(Uuid::new_v4);
                taken.push(reused);
                reused
            });

            DaySlot { id, ..candidate }
        })
        .collect()
}

/// Swap in `schedule` for `clinic_id`; an empty schedule drops the entry.
fn replace_clinic_schedule(doctor: &mut Doctor, clinic_id: Uuid, schedule: Vec<DaySlot>) {
    match doctor
        .appointments_schedule
        .iter_mut()
        .find(|entry| entry.clinic_id == clinic_id)
    {
        Some(entry) => entry.schedule = schedule,
        None => doctor
            .appointments_schedule
            .push(DoctorScheduleEntry { clinic_id, schedule }),
    }

    doctor
        .appointments_schedule
        .retain(|entry| !entry.schedule.is_empty());
}

struct DoctorProfile {
    full_name: String,
    email: String,
    specialization: String,
    registration_number: String,
    phone_number: Option<String>,
    fee: f64,
}

fn validate_affiliation(request: &AffiliateDoctorRequest) -> Result<DoctorProfile, ScheduleError> {
    let required = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let (Some(full_name), Some(email), Some(specialization), Some(registration_number), Some(fee)) = (
        required(&request.full_name),
        required(&request.email),
        required(&request.specialization),
        required(&request.registration_number),
        request.fee.filter(|fee| fee.is_finite() && *fee > 0.0),
    ) else {
        return Err(ScheduleError::Validation("All fields are required".to_string()));
    };

    let email = email.to_lowercase();
    if !EMAIL.is_match(&email) {
        return Err(ScheduleError::Validation("Invalid email format.".to_string()));
    }

    let phone_number = required(&request.phone_number);
    if let Some(phone) = &phone_number {
        if !PHONE.is_match(phone) {
            return Err(ScheduleError::Validation("Invalid phone number format.".to_string()));
        }
    }

    Ok(DoctorProfile {
        full_name,
        email,
        specialization,
        registration_number,
        phone_number,
        fee,
    })
}

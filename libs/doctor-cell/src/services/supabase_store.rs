// libs/doctor-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Clinic, ClinicFee, DaySlot, Doctor, DoctorScheduleEntry, ScheduleError};
use crate::services::store::DoctorStore;

const DOCTOR_SELECT: &str = "*,doctor_schedules(clinic_id,schedule)";

/// `doctors` row with its embedded `doctor_schedules` children.
#[derive(Debug, Deserialize)]
struct DoctorRow {
    id: Uuid,
    full_name: String,
    email: Option<String>,
    specialization: String,
    registration_number: String,
    phone_number: Option<String>,
    #[serde(default)]
    clinics: Vec<Uuid>,
    #[serde(default)]
    fees: Vec<ClinicFee>,
    #[serde(default)]
    doctor_schedules: Vec<ScheduleRow>,
    version: i64,
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    clinic_id: Uuid,
    #[serde(default)]
    schedule: Vec<DaySlot>,
}

impl From<DoctorRow> for Doctor {
    fn from(row: DoctorRow) -> Self {
        Doctor {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            specialization: row.specialization,
            registration_number: row.registration_number,
            phone_number: row.phone_number,
            clinics: row.clinics,
            fees: row.fees,
            appointments_schedule: row
                .doctor_schedules
                .into_iter()
                .map(|row| DoctorScheduleEntry {
                    clinic_id: row.clinic_id,
                    schedule: row.schedule,
                })
                .collect(),
            version: row.version,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveResult {
    version: Option<i64>,
}

/// PostgREST-backed store. Aggregate writes go through the
/// `save_doctor_aggregate` / `delete_doctor_aggregate` functions so the doctor
/// row and its schedule rows change in one transaction, guarded by `version`.
pub struct SupabaseDoctorStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseDoctorStore {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            service_key: config.storage_key().to_string(),
        }
    }

    async fn fetch_doctor(&self, filter: &str) -> Result<Option<Doctor>, ScheduleError> {
        let path = format!("/rest/v1/doctors?{}&select={}", filter, DOCTOR_SELECT);
        let rows: Vec<DoctorRow> = self
            .supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await
            .map_err(dependency)?;

        Ok(rows.into_iter().next().map(Doctor::from))
    }

    async fn save(&self, doctor: &Doctor, expected_version: Option<i64>) -> Result<Doctor, ScheduleError> {
        let params = json!({
            "p_doctor": doctor,
            "p_expected_version": expected_version,
        });

        let result: SaveResult = self
            .supabase
            .rpc("save_doctor_aggregate", Some(&self.service_key), params)
            .await
            .map_err(dependency)?;

        match result.version {
            Some(version) => {
                debug!("Doctor {} saved at version {}", doctor.id, version);
                Ok(Doctor { version, ..doctor.clone() })
            }
            None => Err(ScheduleError::ConcurrentModification(doctor.id)),
        }
    }
}

fn dependency(error: anyhow::Error) -> ScheduleError {
    error!("Doctor store request failed: {}", error);
    ScheduleError::Dependency(error.to_string())
}

#[async_trait]
impl DoctorStore for SupabaseDoctorStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError> {
        self.fetch_doctor(&format!("id=eq.{}", doctor_id)).await
    }

    async fn find_by_registration_number(
        &self,
        registration_number: &str,
    ) -> Result<Option<Doctor>, ScheduleError> {
        let filter = format!(
            "registration_number=eq.{}",
            urlencoding::encode(registration_number)
        );
        self.fetch_doctor(&filter).await
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, ScheduleError> {
        let path = format!("/rest/v1/clinics?id=eq.{}", clinic_id);
        let rows: Vec<Clinic> = self
            .supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await
            .map_err(dependency)?;

        Ok(rows.into_iter().next())
    }

    async fn create_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError> {
        self.save(doctor, None).await
    }

    async fn save_doctor(&self, doctor: &Doctor) -> Result<Doctor, ScheduleError> {
        self.save(doctor, Some(doctor.version)).await
    }

    async fn delete_doctor(&self, doctor_id: Uuid, expected_version: i64) -> Result<(), ScheduleError> {
        let deleted: Value = self
            .supabase
            .rpc(
                "delete_doctor_aggregate",
                Some(&self.service_key),
                json!({ "p_doctor_id": doctor_id, "p_expected_version": expected_version }),
            )
            .await
            .map_err(dependency)?;

        if deleted.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ScheduleError::ConcurrentModification(doctor_id))
        }
    }
}

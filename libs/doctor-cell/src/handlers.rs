use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{caller_clinic_id, require_clinic};

use crate::models::{
    AffiliateDoctorRequest, AffiliationOutcome, ClinicScheduleResponse, RemovalOutcome, SetFeeRequest,
    SetScheduleRequest,
};
use crate::services::schedule::ScheduleService;

/// Lets an admin name the clinic explicitly; clinic accounts default to their own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicQuery {
    pub clinic_id: Option<Uuid>,
}

fn acting_clinic(user: &User, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    match requested {
        Some(clinic_id) => {
            require_clinic(user, &clinic_id.to_string())?;
            Ok(clinic_id)
        }
        None => caller_clinic_id(user)?
            .parse()
            .map_err(|_| AppError::Forbidden("Clinic account required".to_string())),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_clinic_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, clinic_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ClinicScheduleResponse>, AppError> {
    let schedule = service.get_clinic_schedule(doctor_id, clinic_id).await?;
    Ok(Json(schedule))
}

// ==============================================================================
// CLINIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn set_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<SetScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_clinic(&user, &request.clinic_id.to_string())?;

    let clinic_id = request.clinic_id;
    let entry = service.set_schedule(doctor_id, request).await?;

    Ok(Json(json!({
        "doctorId": doctor_id,
        "clinicId": clinic_id,
        "schedule": entry.map(|entry| entry.schedule).unwrap_or_default(),
        "message": "Schedule updated successfully."
    })))
}

#[axum::debug_handler]
pub async fn delete_day_slot(
    State(service): State<Arc<ScheduleService>>,
    Path((doctor_id, slot_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ClinicQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = acting_clinic(&user, query.clinic_id)?;
    let schedule = service.delete_day_slot(doctor_id, clinic_id, slot_id).await?;

    Ok(Json(json!({
        "appointmentsSchedule": schedule,
        "message": "Schedule deleted successfully."
    })))
}

#[axum::debug_handler]
pub async fn affiliate_doctor(
    State(service): State<Arc<ScheduleService>>,
    Query(query): Query<ClinicQuery>,
    Extension(user): Extension<User>,
    Json(request): Json<AffiliateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let clinic_id = acting_clinic(&user, query.clinic_id)?;
    let (doctor, outcome) = service.affiliate_doctor(clinic_id, request).await?;

    let message = match outcome {
        AffiliationOutcome::Created => "Doctor created successfully.",
        AffiliationOutcome::Affiliated => "Doctor added to clinic successfully.",
    };
    info!("{} doctor={} clinic={}", message, doctor.id, clinic_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "doctor": doctor,
            "outcome": outcome,
            "message": message
        })),
    ))
}

#[axum::debug_handler]
pub async fn remove_affiliation(
    State(service): State<Arc<ScheduleService>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ClinicQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = acting_clinic(&user, query.clinic_id)?;
    let outcome = service.remove_affiliation(doctor_id, clinic_id).await?;

    let message = match outcome {
        RemovalOutcome::Detached => "Doctor removed from clinic successfully.",
        RemovalOutcome::Deleted => "Doctor deleted successfully.",
    };

    Ok(Json(json!({ "outcome": outcome, "message": message })))
}

#[axum::debug_handler]
pub async fn set_clinic_fee(
    State(service): State<Arc<ScheduleService>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ClinicQuery>,
    Extension(user): Extension<User>,
    Json(request): Json<SetFeeRequest>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = acting_clinic(&user, query.clinic_id)?;
    let doctor = service.set_clinic_fee(doctor_id, clinic_id, request.fee).await?;

    Ok(Json(json!({
        "doctorId": doctor.id,
        "clinicId": clinic_id,
        "fee": doctor.fee_for(clinic_id),
    })))
}

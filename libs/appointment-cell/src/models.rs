// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::{ClockTime, DaySlot, ScheduleError, Weekday};
use payment_cell::models::PaymentError;
use shared_models::error::AppError;

static APPOINTMENT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0[1-9]|[12][0-9]|3[01])-(0[1-9]|1[0-2])-(19|20)\d{2}$").expect("valid date pattern")
});

/// Gateway notes values are capped at 256 characters.
pub const MAX_NOTE_LENGTH: usize = 256;

pub const SLOT_FULL_MESSAGE: &str =
    "Maximum limit for appointment reached. Please choose another date or time.";

// ==============================================================================
// CORE ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(AppointmentError::Validation("Invalid gender provided.".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Confirmed => "confirmed",
            PendingStatus::Rejected => "rejected",
            PendingStatus::Expired => "expired",
        };
        f.write_str(status)
    }
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

/// Doctor and clinic details as they were when the payment was confirmed.
/// Written once, never refreshed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSnapshot {
    pub doctor_name: String,
    pub specialization: String,
    pub doctor_fee: Option<f64>,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub created_by: String,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    #[serde(flatten)]
    pub snapshot: AppointmentSnapshot,
    pub full_name: String,
    pub phone_number: String,
    pub age: u32,
    pub gender: Gender,
    pub appointment_day: Weekday,
    pub appointment_date: String,
    pub appointment_time_from: ClockTime,
    pub appointment_time_to: ClockTime,
    pub health_insured: bool,
    pub terms_accepted: bool,
    pub billing_address: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_id: String,
    pub order_id: String,
    pub amount_paid: f64,
    pub total_amount: f64,
    pub booking_commission: f64,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
            appointment_date: self.appointment_date.clone(),
            time_from: self.appointment_time_from,
            time_to: self.appointment_time_to,
        }
    }

    pub fn same_payment(&self, order_id: &str, payment_id: &str) -> bool {
        self.order_id == order_id && self.payment_id == payment_id
    }
}

/// Exact (doctor, clinic, date, window) a booking counts against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: String,
    pub time_from: ClockTime,
    pub time_to: ClockTime,
}

impl SlotKey {
    pub fn for_slot(doctor_id: Uuid, clinic_id: Uuid, appointment_date: &str, slot: &DaySlot) -> Self {
        Self {
            doctor_id,
            clinic_id,
            appointment_date: appointment_date.to_string(),
            time_from: slot.start_time,
            time_to: slot.end_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Appointment),
    /// `(orderId, paymentId)` was already booked; nothing written.
    Duplicate(Appointment),
    /// No seat left. The payment is now recorded as rejected.
    SlotFull { booked: u32 },
    /// The payment was rejected by an earlier delivery; nothing written.
    AlreadyRejected,
}

/// A captured payment that was refused a seat. Keyed like appointments by
/// `(orderId, paymentId)`; a payment has either a rejection or an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRejection {
    pub order_id: String,
    pub payment_id: String,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionOutcome {
    Recorded,
    AlreadyRejected,
    /// An appointment already holds a seat for this payment; nothing written.
    Booked(Appointment),
}

// ==============================================================================
// BOOKING INTENT
// ==============================================================================

/// Booking request as received. Booleans and age stay untyped so that
/// strictness can be enforced with domain messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingIntentRequest {
    pub doctor_id: Option<String>,
    pub clinic_id: Option<String>,
    #[serde(alias = "scheduledId")]
    pub schedule_entry_id: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub age: Option<Value>,
    pub gender: Option<String>,
    pub health_insured: Option<Value>,
    pub billing_address: Option<String>,
    pub terms_accepted: Option<Value>,
    pub appointment_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIntent {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub schedule_entry_id: Uuid,
    pub appointment_date: String,
    pub full_name: String,
    pub phone_number: String,
    pub age: u32,
    pub gender: Gender,
    pub health_insured: bool,
    pub terms_accepted: bool,
    pub billing_address: Option<String>,
}

impl BookingIntentRequest {
    pub fn validate(&self) -> Result<ValidatedIntent, AppointmentError> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let (
            Some(doctor_id),
            Some(clinic_id),
            Some(schedule_entry_id),
            Some(full_name),
            Some(phone_number),
            Some(age),
            Some(gender),
            Some(appointment_date),
        ) = (
            present(&self.doctor_id),
            present(&self.clinic_id),
            present(&self.schedule_entry_id),
            present(&self.full_name),
            present(&self.phone_number),
            self.age.as_ref().filter(|age| !age.is_null()),
            present(&self.gender),
            present(&self.appointment_date),
        )
        else {
            return Err(AppointmentError::Validation(
                "All required fields must be filled.".to_string(),
            ));
        };

        validate_appointment_date(&appointment_date)?;

        let (Some(Value::Bool(terms_accepted)), Some(Value::Bool(health_insured))) =
            (&self.terms_accepted, &self.health_insured)
        else {
            return Err(AppointmentError::Validation(
                "Terms and conditions and health insurance status are required.".to_string(),
            ));
        };

        if !terms_accepted {
            return Err(AppointmentError::Validation(
                "Please accept the terms and conditions.".to_string(),
            ));
        }

        let gender: Gender = gender.parse()?;
        let age = parse_age(age)?;
        let billing_address = present(&self.billing_address);

        for (field, value) in [
            ("fullName", Some(&full_name)),
            ("phoneNumber", Some(&phone_number)),
            ("billingAddress", billing_address.as_ref()),
        ] {
            if value.is_some_and(|value| value.chars().count() > MAX_NOTE_LENGTH) {
                return Err(AppointmentError::Validation(format!(
                    "{} must be at most {} characters.",
                    field, MAX_NOTE_LENGTH
                )));
            }
        }

        Ok(ValidatedIntent {
            doctor_id: parse_id("doctorId", &doctor_id)?,
            clinic_id: parse_id("clinicId", &clinic_id)?,
            schedule_entry_id: parse_id("scheduledId", &schedule_entry_id)?,
            appointment_date,
            full_name,
            phone_number,
            age,
            gender,
            health_insured: *health_insured,
            terms_accepted: *terms_accepted,
            billing_address,
        })
    }
}

/// `dd-mm-yyyy` that is also a real calendar date.
pub fn validate_appointment_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    let invalid = || {
        AppointmentError::Validation("Invalid date format. Accepted format: dd-mm-yyyy.".to_string())
    };

    if !APPOINTMENT_DATE.is_match(raw) {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(raw, "%d-%m-%Y").map_err(|_| invalid())
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid, AppointmentError> {
    raw.parse()
        .map_err(|_| AppointmentError::Validation(format!("Invalid {}.", field)))
}

fn parse_age(value: &Value) -> Result<u32, AppointmentError> {
    let age = match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(raw) => raw.trim().parse::<u32>().ok(),
        _ => None,
    };

    age.filter(|age| (1..=150).contains(age))
        .ok_or_else(|| AppointmentError::Validation("Age must be a whole number between 1 and 150.".to_string()))
}

// ==============================================================================
// BOOKING METADATA
// ==============================================================================

/// Everything needed to rebuild an appointment at confirmation time. Travels
/// as gateway order notes and inside the pending booking record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingMetadata {
    pub user_id: String,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: String,
    pub appointment_day: Weekday,
    pub appointment_time_from: ClockTime,
    pub appointment_time_to: ClockTime,
    pub full_name: String,
    pub phone_number: String,
    pub age: u32,
    pub gender: Gender,
    pub health_insured: bool,
    pub terms_accepted: bool,
    pub billing_address: Option<String>,
}

impl BookingMetadata {
    pub fn new(user_id: &str, intent: &ValidatedIntent, slot: &DaySlot) -> Self {
        Self {
            user_id: user_id.to_string(),
            doctor_id: intent.doctor_id,
            clinic_id: intent.clinic_id,
            appointment_date: intent.appointment_date.clone(),
            appointment_day: slot.day,
            appointment_time_from: slot.start_time,
            appointment_time_to: slot.end_time,
            full_name: intent.full_name.clone(),
            phone_number: intent.phone_number.clone(),
            age: intent.age,
            gender: intent.gender,
            health_insured: intent.health_insured,
            terms_accepted: intent.terms_accepted,
            billing_address: intent.billing_address.clone(),
        }
    }

    /// Flat string map, the only shape the gateway accepts for notes.
    pub fn to_notes(&self) -> Map<String, Value> {
        let mut notes = Map::new();
        let mut put = |key: &str, value: String| {
            notes.insert(key.to_string(), Value::String(value));
        };

        put("userId", self.user_id.clone());
        put("doctorId", self.doctor_id.to_string());
        put("clinicId", self.clinic_id.to_string());
        put("appointmentDate", self.appointment_date.clone());
        put("appointmentDay", self.appointment_day.to_string());
        put("appointmentTimeFrom", self.appointment_time_from.to_string());
        put("appointmentTimeTo", self.appointment_time_to.to_string());
        put("fullName", self.full_name.clone());
        put("phoneNumber", self.phone_number.clone());
        put("age", self.age.to_string());
        put("gender", self.gender.to_string());
        put("healthInsured", self.health_insured.to_string());
        put("termsAccepted", self.terms_accepted.to_string());
        if let Some(address) = &self.billing_address {
            put("billingAddress", address.clone());
        }

        notes
    }

    pub fn from_notes(notes: &Value) -> Result<Self, AppointmentError> {
        let notes = notes.as_object().ok_or_else(|| {
            AppointmentError::Validation("Payment carries no booking metadata".to_string())
        })?;

        Ok(Self {
            user_id: note(notes, "userId")?.to_string(),
            doctor_id: parse_note(notes, "doctorId")?,
            clinic_id: parse_note(notes, "clinicId")?,
            appointment_date: note(notes, "appointmentDate")?.to_string(),
            appointment_day: parse_note(notes, "appointmentDay")?,
            appointment_time_from: parse_note(notes, "appointmentTimeFrom")?,
            appointment_time_to: parse_note(notes, "appointmentTimeTo")?,
            full_name: note(notes, "fullName")?.to_string(),
            phone_number: note(notes, "phoneNumber")?.to_string(),
            age: parse_note(notes, "age")?,
            gender: parse_note(notes, "gender")?,
            health_insured: parse_note(notes, "healthInsured")?,
            terms_accepted: parse_note(notes, "termsAccepted")?,
            billing_address: notes
                .get("billingAddress")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn note<'a>(notes: &'a Map<String, Value>, key: &str) -> Result<&'a str, AppointmentError> {
    notes
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppointmentError::Validation(format!("Payment metadata is missing {}", key)))
}

fn parse_note<T>(notes: &Map<String, Value>, key: &str) -> Result<T, AppointmentError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    note(notes, key)?
        .parse()
        .map_err(|e| AppointmentError::Validation(format!("Payment metadata has invalid {}: {}", key, e)))
}

// ==============================================================================
// PENDING BOOKINGS
// ==============================================================================

/// Server-side record of an issued order awaiting payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingBooking {
    pub order_id: String,
    pub schedule_entry_id: Uuid,
    pub metadata: BookingMetadata,
    pub amount_minor_units: u64,
    pub currency: String,
    pub status: PendingStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderIssued {
    pub order_id: String,
    pub amount_minor_units: u64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailabilityQuery {
    pub doctor_id: Option<String>,
    pub clinic_id: Option<String>,
    #[serde(alias = "scheduledId")]
    pub schedule_entry_id: Option<String>,
    pub appointment_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    pub schedule_entry_id: Uuid,
    pub clinic_id: Uuid,
    pub doctor_id: Uuid,
    pub max_slots: u32,
    pub booked_slot: u32,
}

/// What the webhook handler did with one delivery. Never surfaced to the
/// gateway, which always receives 200.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Bad signature or unreadable body.
    Discarded { reason: String },
    /// Not a payment capture.
    Ignored { event: String },
    Confirmed { appointment_id: Uuid },
    Duplicate { appointment_id: Uuid },
    /// Paid but could not be booked; refund requested when possible.
    Rejected { reason: String, refund_id: Option<String> },
    /// Redelivery of a payment an earlier delivery rejected. No side effects.
    AlreadyRejected { payment_id: String },
    Failed { reason: String },
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{}", SLOT_FULL_MESSAGE)]
    SlotFull,

    #[error("Webhook signature verification failed")]
    Authenticity,

    #[error("Dependency error: {0}")]
    Dependency(String),
}

impl From<ScheduleError> for AppointmentError {
    fn from(error: ScheduleError) -> Self {
        match error {
            ScheduleError::Validation(msg) => AppointmentError::Validation(msg),
            ScheduleError::NotFound(msg) => AppointmentError::NotFound(msg),
            e @ ScheduleError::Conflict(_) => AppointmentError::Validation(e.to_string()),
            e @ ScheduleError::ConcurrentModification(_) => AppointmentError::Dependency(e.to_string()),
            ScheduleError::Dependency(msg) => AppointmentError::Dependency(msg),
        }
    }
}

impl From<PaymentError> for AppointmentError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::InvalidSignature => AppointmentError::Authenticity,
            PaymentError::MalformedPayload(msg) => AppointmentError::Validation(msg),
            e => AppointmentError::Dependency(e.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(msg) => AppError::NotFound(msg),
            AppointmentError::SlotFull => AppError::BadRequest(SLOT_FULL_MESSAGE.to_string()),
            e @ AppointmentError::Authenticity => AppError::Auth(e.to_string()),
            AppointmentError::Dependency(msg) => AppError::ExternalService(msg),
        }
    }
}

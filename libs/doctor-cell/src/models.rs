// libs/doctor-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("valid clock pattern"));

// ==============================================================================
// SCHEDULE PRIMITIVES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weekday::ALL
            .into_iter()
            .find(|day| day.as_str() == s)
            .ok_or_else(|| ScheduleError::Validation(format!("Invalid day: {}", s)))
    }
}

/// Wall-clock time within a single day, stored as minutes since midnight.
/// Always renders as zero-padded 24h `HH:MM`, so string equality and minute
/// equality coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < 24 * 60).then_some(Self(minutes))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for ClockTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = CLOCK_TIME
            .captures(s)
            .ok_or_else(|| ScheduleError::Validation(format!("Invalid time: {}", s)))?;

        // the pattern guarantees both groups are in range
        let hours: u16 = captures[1].parse().unwrap_or_default();
        let minutes: u16 = captures[2].parse().unwrap_or_default();
        Ok(Self(hours * 60 + minutes))
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One weekly availability window at one clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaySlot {
    pub id: Uuid,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub max_slots: u32,
}

impl DaySlot {
    pub fn same_window(&self, other: &DaySlot) -> bool {
        self.day == other.day
            && self.start_time == other.start_time
            && self.end_time == other.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorScheduleEntry {
    pub clinic_id: Uuid,
    pub schedule: Vec<DaySlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicFee {
    pub clinic_id: Uuid,
    pub fee: f64,
}

// ==============================================================================
// AGGREGATES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub specialization: String,
    pub registration_number: String,
    pub phone_number: Option<String>,
    pub clinics: Vec<Uuid>,
    pub fees: Vec<ClinicFee>,
    pub appointments_schedule: Vec<DoctorScheduleEntry>,
    /// Optimistic concurrency token, bumped on every save.
    pub version: i64,
}

impl Doctor {
    pub fn is_affiliated(&self, clinic_id: Uuid) -> bool {
        self.clinics.contains(&clinic_id)
    }

    pub fn schedule_for(&self, clinic_id: Uuid) -> Option<&DoctorScheduleEntry> {
        self.appointments_schedule
            .iter()
            .find(|entry| entry.clinic_id == clinic_id)
    }

    pub fn fee_for(&self, clinic_id: Uuid) -> Option<f64> {
        self.fees
            .iter()
            .find(|fee| fee.clinic_id == clinic_id)
            .map(|fee| fee.fee)
    }

    pub fn find_slot(&self, clinic_id: Uuid, slot_id: Uuid) -> Option<&DaySlot> {
        self.schedule_for(clinic_id)?
            .schedule
            .iter()
            .find(|slot| slot.id == slot_id)
    }

    /// Schedule entries of every clinic except `clinic_id`.
    pub fn other_clinic_entries(&self, clinic_id: Uuid) -> Vec<&DoctorScheduleEntry> {
        self.appointments_schedule
            .iter()
            .filter(|entry| entry.clinic_id != clinic_id)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address_one: Option<String>,
    pub address_two: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

impl Clinic {
    pub fn full_address(&self) -> String {
        [
            self.address_one.as_deref(),
            self.address_two.as_deref(),
            Some(self.city.as_str()),
            self.state.as_deref(),
            self.pincode.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Unvalidated slot as received over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySlotRequest {
    pub id: Option<Uuid>,
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_slots: Option<Value>,
}

/// Slot that passed validation; `id` is assigned when the write is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedSlot {
    pub id: Option<Uuid>,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub max_slots: u32,
}

impl DaySlotRequest {
    pub fn new(day: &str, start_time: &str, end_time: &str, max_slots: u32) -> Self {
        Self {
            id: None,
            day: Some(day.to_string()),
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            max_slots: Some(Value::from(max_slots)),
        }
    }

    pub fn validate(&self) -> Result<ProposedSlot, ScheduleError> {
        let (Some(day), Some(start_time), Some(end_time), Some(max_slots)) = (
            self.day.as_deref(),
            self.start_time.as_deref(),
            self.end_time.as_deref(),
            self.max_slots.as_ref(),
        ) else {
            return Err(ScheduleError::Validation(
                "Each schedule must include day, startTime, endTime and maxSlots.".to_string(),
            ));
        };

        let day: Weekday = day.parse()?;

        let time_error = || ScheduleError::Validation(
            format!("Time should be in 24-hour format (HH:MM) for {}", day),
        );
        let start_time: ClockTime = start_time.parse().map_err(|_| time_error())?;
        let end_time: ClockTime = end_time.parse().map_err(|_| time_error())?;

        if end_time <= start_time {
            return Err(ScheduleError::Validation(format!(
                "endTime must be after startTime on the same day for {}",
                day
            )));
        }

        let max_slots = parse_max_slots(max_slots).ok_or_else(|| {
            ScheduleError::Validation(format!(
                "maxSlots must be a non-negative integer for {}",
                day
            ))
        })?;

        Ok(ProposedSlot {
            id: self.id,
            day,
            start_time,
            end_time,
            max_slots,
        })
    }
}

fn parse_max_slots(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(raw) => raw.trim().parse::<u32>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScheduleRequest {
    pub clinic_id: Uuid,
    pub schedule: Vec<DaySlotRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateDoctorRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<String>,
    pub registration_number: Option<String>,
    pub phone_number: Option<String>,
    pub fee: Option<f64>,
    pub schedule: Option<Vec<DaySlotRequest>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFeeRequest {
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicScheduleResponse {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub fee: Option<f64>,
    pub schedule: Vec<DaySlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AffiliationOutcome {
    Created,
    Affiliated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalOutcome {
    /// Other clinics remain; only this clinic's entries were dropped.
    Detached,
    /// That was the last clinic; the doctor record is gone.
    Deleted,
}

// ==============================================================================
// ERRORS
// ==============================================================================

/// An existing window at another clinic that overlaps a proposed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConflict {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub clinic_id: Uuid,
}

impl fmt::Display for ScheduleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time conflict: Doctor is already scheduled at another clinic ({}) on {} from {} to {}.",
            self.clinic_id, self.day, self.start_time, self.end_time
        )
    }
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(ScheduleConflict),

    #[error("Doctor {0} was modified concurrently, retry the request")]
    ConcurrentModification(Uuid),

    #[error("Dependency error: {0}")]
    Dependency(String),
}

impl From<ScheduleError> for AppError {
    fn from(error: ScheduleError) -> Self {
        match error {
            ScheduleError::Validation(msg) => AppError::ValidationError(msg),
            ScheduleError::NotFound(msg) => AppError::NotFound(msg),
            ScheduleError::Conflict(conflict) => AppError::BadRequest(conflict.to_string()),
            e @ ScheduleError::ConcurrentModification(_) => AppError::Conflict(e.to_string()),
            ScheduleError::Dependency(msg) => AppError::ExternalService(msg),
        }
    }
}

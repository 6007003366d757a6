// libs/doctor-cell/src/services/conflict.rs
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    ClockTime, Doctor, DoctorScheduleEntry, ProposedSlot, ScheduleConflict, ScheduleError, Weekday,
};

/// Half-open `[start, end)` intervals intersect.
pub fn windows_overlap(
    a_start: ClockTime,
    a_end: ClockTime,
    b_start: ClockTime,
    b_end: ClockTime,
) -> bool {
    a_start.minutes() < b_end.minutes() && a_end.minutes() > b_start.minutes()
}

/// First window in `existing` that overlaps `day`/`[start, end)`, if any.
/// Callers pass only the entries of clinics other than the one being written.
pub fn find_conflict(
    day: Weekday,
    start: ClockTime,
    end: ClockTime,
    existing: &[&DoctorScheduleEntry],
) -> Option<ScheduleConflict> {
    existing.iter().find_map(|entry| {
        entry
            .schedule
            .iter()
            .find(|slot| slot.day == day && windows_overlap(start, end, slot.start_time, slot.end_time))
            .map(|slot| ScheduleConflict {
                day: slot.day,
                start_time: slot.start_time,
                end_time: slot.end_time,
                clinic_id: entry.clinic_id,
            })
    })
}

pub fn has_conflict(proposed: &ProposedSlot, existing: &[&DoctorScheduleEntry]) -> bool {
    find_conflict(proposed.day, proposed.start_time, proposed.end_time, existing).is_some()
}

/// Gate a write of `proposed` for `clinic_id` against the doctor's other clinics.
pub fn ensure_no_cross_clinic_conflict(
    doctor: &Doctor,
    clinic_id: Uuid,
    proposed: &[ProposedSlot],
) -> Result<(), ScheduleError> {
    let others = doctor.other_clinic_entries(clinic_id);
    if others.is_empty() {
        return Ok(());
    }

    for slot in proposed {
        if let Some(conflict) = find_conflict(slot.day, slot.start_time, slot.end_time, &others) {
            debug!(
                "Schedule conflict for doctor {} on {}: {}-{} overlaps clinic {}",
                doctor.id, slot.day, slot.start_time, slot.end_time, conflict.clinic_id
            );
            return Err(ScheduleError::Conflict(conflict));
        }
    }

    Ok(())
}

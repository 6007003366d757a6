// libs/doctor-cell/tests/schedule_service_test.rs
use std::sync::Arc;

use assert_matches::assert_matches;
use rand::Rng;
use uuid::Uuid;

use doctor_cell::models::*;
use doctor_cell::services::{
    find_conflict, has_conflict, windows_overlap, DoctorStore, InMemoryDoctorStore, LocalDoctorLocks,
    ScheduleService,
};

struct Fixture {
    store: Arc<InMemoryDoctorStore>,
    service: Arc<ScheduleService>,
    doctor_id: Uuid,
    clinic_a: Uuid,
    clinic_b: Uuid,
}

fn clinic(id: Uuid, name: &str) -> Clinic {
    Clinic {
        id,
        name: name.to_string(),
        email: None,
        phone_number: None,
        address_one: Some("1 Main Street".to_string()),
        address_two: None,
        city: "Pune".to_string(),
        state: None,
        pincode: None,
    }
}

/// One doctor affiliated with clinics A and B, no schedules yet.
async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryDoctorStore::new());
    let clinic_a = Uuid::new_v4();
    let clinic_b = Uuid::new_v4();
    store.insert_clinic(clinic(clinic_a, "Clinic A")).await;
    store.insert_clinic(clinic(clinic_b, "Clinic B")).await;

    let doctor_id = Uuid::new_v4();
    store
        .insert_doctor(Doctor {
            id: doctor_id,
            full_name: "Dr. Meera Iyer".to_string(),
            email: Some("meera@example.com".to_string()),
            specialization: "Dermatology".to_string(),
            registration_number: "REG-42".to_string(),
            phone_number: None,
            clinics: vec![clinic_a, clinic_b],
            fees: vec![
                ClinicFee { clinic_id: clinic_a, fee: 400.0 },
                ClinicFee { clinic_id: clinic_b, fee: 450.0 },
            ],
            appointments_schedule: vec![],
            version: 1,
        })
        .await;

    let service = Arc::new(ScheduleService::new(
        store.clone(),
        Arc::new(LocalDoctorLocks::default()),
    ));

    Fixture { store, service, doctor_id, clinic_a, clinic_b }
}

fn schedule(clinic_id: Uuid, slots: &[(&str, &str, &str, u32)]) -> SetScheduleRequest {
    SetScheduleRequest {
        clinic_id,
        schedule: slots
            .iter()
            .map(|(day, start, end, max)| DaySlotRequest::new(day, start, end, *max))
            .collect(),
    }
}

#[tokio::test]
async fn overlapping_window_at_other_clinic_is_rejected() {
    let f = fixture().await;

    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();

    let result = f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_b, &[("Monday", "10:00", "11:00", 2)]))
        .await;

    assert_matches!(result, Err(ScheduleError::Conflict(conflict)) => {
        assert_eq!(conflict.day, Weekday::Monday);
        assert_eq!(conflict.start_time.to_string(), "09:00");
        assert_eq!(conflict.end_time.to_string(), "12:00");
        assert_eq!(conflict.clinic_id, f.clinic_a);
    });

    // Nothing was written for clinic B
    let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
    assert!(doctor.schedule_for(f.clinic_b).is_none());
}

#[tokio::test]
async fn adjacent_window_at_other_clinic_is_accepted() {
    let f = fixture().await;

    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();

    let entry = f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_b, &[("Monday", "12:00", "13:00", 2)]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.clinic_id, f.clinic_b);
    assert_eq!(entry.schedule.len(), 1);
}

#[tokio::test]
async fn same_window_on_another_day_is_accepted() {
    let f = fixture().await;

    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();

    assert!(f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_b, &[("Tuesday", "09:00", "12:00", 4)]))
        .await
        .is_ok());
}

#[tokio::test]
async fn own_clinic_windows_may_overlap_each_other() {
    let f = fixture().await;

    let entry = f
        .service
        .set_schedule(
            f.doctor_id,
            schedule(
                f.clinic_a,
                &[("Monday", "09:00", "12:00", 4), ("Monday", "10:00", "11:00", 1)],
            ),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.schedule.len(), 2);
}

#[tokio::test]
async fn rewriting_the_same_schedule_is_idempotent() {
    let f = fixture().await;
    let request = schedule(
        f.clinic_a,
        &[("Monday", "09:00", "12:00", 4), ("Wednesday", "14:00", "17:00", 6)],
    );

    let first = f.service.set_schedule(f.doctor_id, request.clone()).await.unwrap();
    let second = f.service.set_schedule(f.doctor_id, request).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn schedule_write_replaces_previous_windows() {
    let f = fixture().await;

    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();
    let entry = f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Friday", "15:00", "18:00", 3)]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.schedule.len(), 1);
    assert_eq!(entry.schedule[0].day, Weekday::Friday);

    // Monday at clinic B is free again
    assert!(f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_b, &[("Monday", "10:00", "11:00", 2)]))
        .await
        .is_ok());
}

#[tokio::test]
async fn validation_failures_leave_schedule_untouched() {
    let f = fixture().await;

    for request in [
        schedule(f.clinic_a, &[("Moonday", "09:00", "12:00", 1)]),
        schedule(f.clinic_a, &[("Monday", "9:00", "12:00", 1)]),
        schedule(f.clinic_a, &[("Monday", "12:00", "09:00", 1)]),
    ] {
        assert_matches!(
            f.service.set_schedule(f.doctor_id, request).await,
            Err(ScheduleError::Validation(_))
        );
    }

    let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
    assert!(doctor.appointments_schedule.is_empty());
    assert_eq!(doctor.version, 1);
}

#[tokio::test]
async fn repeated_slot_id_in_one_write_is_rejected() {
    let f = fixture().await;
    let shared_id = Uuid::new_v4();

    let mut monday = DaySlotRequest::new("Monday", "09:00", "10:00", 1);
    monday.id = Some(shared_id);
    let mut tuesday = DaySlotRequest::new("Tuesday", "14:00", "18:00", 5);
    tuesday.id = Some(shared_id);

    let request = SetScheduleRequest { clinic_id: f.clinic_a, schedule: vec![monday, tuesday] };
    assert_matches!(
        f.service.set_schedule(f.doctor_id, request).await,
        Err(ScheduleError::Validation(msg)) if msg.contains(&shared_id.to_string())
    );

    let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
    assert!(doctor.appointments_schedule.is_empty());
}

#[tokio::test]
async fn distinct_slot_ids_are_kept() {
    let f = fixture().await;
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    let mut monday = DaySlotRequest::new("Monday", "09:00", "10:00", 1);
    monday.id = Some(first);
    let mut tuesday = DaySlotRequest::new("Tuesday", "14:00", "18:00", 5);
    tuesday.id = Some(second);

    let request = SetScheduleRequest { clinic_id: f.clinic_a, schedule: vec![monday, tuesday] };
    let entry = f.service.set_schedule(f.doctor_id, request).await.unwrap().unwrap();

    let ids: Vec<Uuid> = entry.schedule.iter().map(|slot| slot.id).collect();
    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
async fn unaffiliated_clinic_is_not_found() {
    let f = fixture().await;

    let result = f
        .service
        .set_schedule(f.doctor_id, schedule(Uuid::new_v4(), &[("Monday", "09:00", "12:00", 1)]))
        .await;

    assert_matches!(result, Err(ScheduleError::NotFound(msg)) if msg == "Doctor not found.");
}

#[tokio::test]
async fn concurrent_conflicting_writes_admit_at_most_one() {
    let f = fixture().await;

    let at_a = {
        let service = f.service.clone();
        let request = schedule(f.clinic_a, &[("Thursday", "09:00", "12:00", 2)]);
        let doctor_id = f.doctor_id;
        tokio::spawn(async move { service.set_schedule(doctor_id, request).await })
    };
    let at_b = {
        let service = f.service.clone();
        let request = schedule(f.clinic_b, &[("Thursday", "11:00", "13:00", 2)]);
        let doctor_id = f.doctor_id;
        tokio::spawn(async move { service.set_schedule(doctor_id, request).await })
    };

    let results = [at_a.await.unwrap(), at_b.await.unwrap()];
    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(ScheduleError::Conflict(_)))));

    let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
    assert_eq!(doctor.appointments_schedule.len(), 1);
}

#[tokio::test]
async fn random_windows_never_leave_overlaps_across_clinics() {
    let f = fixture().await;
    let clinics = [f.clinic_a, f.clinic_b];
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let clinic_id = clinics[rng.gen_range(0..clinics.len())];
        let day = Weekday::ALL[rng.gen_range(0..2)];
        let start = rng.gen_range(0..(24 * 60 - 1));
        let end = rng.gen_range((start + 1)..(24 * 60));
        let slot = DaySlotRequest::new(
            day.as_str(),
            &ClockTime::from_minutes(start).unwrap().to_string(),
            &ClockTime::from_minutes(end).unwrap().to_string(),
            1,
        );

        let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
        let others = doctor.other_clinic_entries(clinic_id);
        let proposed = slot.validate().unwrap();
        let expected_conflict =
            find_conflict(proposed.day, proposed.start_time, proposed.end_time, &others).is_some();

        let request = SetScheduleRequest { clinic_id, schedule: vec![slot] };
        let result = f.service.set_schedule(f.doctor_id, request).await;
        assert_eq!(result.is_err(), expected_conflict);

        // Invariant: no two windows at different clinics overlap on the same day
        let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
        for entry in &doctor.appointments_schedule {
            let others = doctor.other_clinic_entries(entry.clinic_id);
            for slot in &entry.schedule {
                assert!(find_conflict(slot.day, slot.start_time, slot.end_time, &others).is_none());
            }
        }
    }
}

fn clock(minutes: u16) -> ClockTime {
    ClockTime::from_minutes(minutes).unwrap()
}

#[test]
fn has_conflict_matches_interval_inequality() {
    let mut rng = rand::thread_rng();
    let clinic_id = Uuid::new_v4();

    for round in 0..2000 {
        let a1: u16 = rng.gen_range(0..(24 * 60 - 1));
        let b1: u16 = rng.gen_range((a1 + 1)..(24 * 60));
        // Every fourth round the second window starts or ends exactly on a boundary
        let (a2, b2): (u16, u16) = match round % 4 {
            0 if b1 < 24 * 60 - 1 => (b1, rng.gen_range((b1 + 1)..(24 * 60))),
            0 if a1 > 0 => (rng.gen_range(0..a1), a1),
            _ => {
                let a2 = rng.gen_range(0..(24 * 60 - 1));
                (a2, rng.gen_range((a2 + 1)..(24 * 60)))
            }
        };

        let expected = a1 < b2 && a2 < b1;
        let by_minutes = (a1..b1).any(|minute| (a2..b2).contains(&minute));
        assert_eq!(expected, by_minutes);

        assert_eq!(windows_overlap(clock(a1), clock(b1), clock(a2), clock(b2)), expected);

        let entry = DoctorScheduleEntry {
            clinic_id,
            schedule: vec![DaySlot {
                id: Uuid::new_v4(),
                day: Weekday::Wednesday,
                start_time: clock(a2),
                end_time: clock(b2),
                max_slots: 1,
            }],
        };
        let proposed = ProposedSlot {
            id: None,
            day: Weekday::Wednesday,
            start_time: clock(a1),
            end_time: clock(b1),
            max_slots: 1,
        };
        assert_eq!(
            has_conflict(&proposed, &[&entry]),
            expected,
            "[{}, {}) against [{}, {})",
            a1, b1, a2, b2
        );

        let other_day = ProposedSlot { day: Weekday::Thursday, ..proposed };
        assert!(!has_conflict(&other_day, &[&entry]));
    }
}

#[test]
fn touching_windows_do_not_conflict() {
    let clinic_id = Uuid::new_v4();
    let entry = DoctorScheduleEntry {
        clinic_id,
        schedule: vec![DaySlot {
            id: Uuid::new_v4(),
            day: Weekday::Monday,
            start_time: clock(9 * 60),
            end_time: clock(12 * 60),
            max_slots: 1,
        }],
    };
    let slot = |start: u16, end: u16| ProposedSlot {
        id: None,
        day: Weekday::Monday,
        start_time: clock(start),
        end_time: clock(end),
        max_slots: 1,
    };

    assert!(!has_conflict(&slot(12 * 60, 13 * 60), &[&entry]));
    assert!(!has_conflict(&slot(8 * 60, 9 * 60), &[&entry]));
    assert!(has_conflict(&slot(11 * 60 + 59, 13 * 60), &[&entry]));
    assert!(has_conflict(&slot(8 * 60, 9 * 60 + 1), &[&entry]));
}

#[tokio::test]
async fn deleting_last_day_slot_drops_clinic_entry() {
    let f = fixture().await;

    let entry = f
        .service
        .set_schedule(
            f.doctor_id,
            schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4), ("Friday", "09:00", "12:00", 4)]),
        )
        .await
        .unwrap()
        .unwrap();

    let remaining = f
        .service
        .delete_day_slot(f.doctor_id, f.clinic_a, entry.schedule[0].id)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].schedule.len(), 1);

    let remaining = f
        .service
        .delete_day_slot(f.doctor_id, f.clinic_a, entry.schedule[1].id)
        .await
        .unwrap();
    assert!(remaining.is_empty());

    assert_matches!(
        f.service.delete_day_slot(f.doctor_id, f.clinic_a, entry.schedule[1].id).await,
        Err(ScheduleError::NotFound(_))
    );
}

#[tokio::test]
async fn affiliation_creates_then_rejects_duplicate() {
    let f = fixture().await;
    let clinic_c = Uuid::new_v4();
    f.store.insert_clinic(clinic(clinic_c, "Clinic C")).await;

    let request = AffiliateDoctorRequest {
        full_name: Some("Dr. Kabir Shah".to_string()),
        email: Some("Kabir@Example.com".to_string()),
        specialization: Some("Orthopedics".to_string()),
        registration_number: Some("REG-77".to_string()),
        phone_number: Some("+919900112233".to_string()),
        fee: Some(600.0),
        schedule: Some(vec![DaySlotRequest::new("Saturday", "10:00", "13:00", 5)]),
    };

    let (doctor, outcome) = f.service.affiliate_doctor(clinic_c, request.clone()).await.unwrap();
    assert_eq!(outcome, AffiliationOutcome::Created);
    assert_eq!(doctor.email.as_deref(), Some("kabir@example.com"));
    assert_eq!(doctor.fee_for(clinic_c), Some(600.0));
    assert_eq!(doctor.schedule_for(clinic_c).unwrap().schedule.len(), 1);

    assert_matches!(
        f.service.affiliate_doctor(clinic_c, request).await,
        Err(ScheduleError::Validation(msg)) if msg == "Doctor already exists in this clinic."
    );
}

#[tokio::test]
async fn affiliating_existing_doctor_checks_other_clinics() {
    let f = fixture().await;
    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();

    let clinic_c = Uuid::new_v4();
    f.store.insert_clinic(clinic(clinic_c, "Clinic C")).await;

    let mut request = AffiliateDoctorRequest {
        full_name: Some("Dr. Meera Iyer".to_string()),
        email: Some("meera@example.com".to_string()),
        specialization: Some("Dermatology".to_string()),
        registration_number: Some("REG-42".to_string()),
        phone_number: None,
        fee: Some(350.0),
        schedule: Some(vec![DaySlotRequest::new("Monday", "11:00", "14:00", 2)]),
    };

    assert_matches!(
        f.service.affiliate_doctor(clinic_c, request.clone()).await,
        Err(ScheduleError::Conflict(_))
    );

    request.schedule = Some(vec![DaySlotRequest::new("Monday", "12:00", "14:00", 2)]);
    let (doctor, outcome) = f.service.affiliate_doctor(clinic_c, request).await.unwrap();
    assert_eq!(outcome, AffiliationOutcome::Affiliated);
    assert_eq!(doctor.id, f.doctor_id);
    assert_eq!(doctor.clinics.len(), 3);
    assert_eq!(doctor.fee_for(clinic_c), Some(350.0));
}

#[tokio::test]
async fn affiliation_requires_existing_clinic() {
    let f = fixture().await;

    let request = AffiliateDoctorRequest {
        full_name: Some("Dr. Nobody".to_string()),
        email: Some("nobody@example.com".to_string()),
        specialization: Some("General".to_string()),
        registration_number: Some("REG-0".to_string()),
        phone_number: None,
        fee: Some(100.0),
        schedule: None,
    };

    assert_matches!(
        f.service.affiliate_doctor(Uuid::new_v4(), request).await,
        Err(ScheduleError::NotFound(msg)) if msg == "Clinic not found."
    );
}

#[tokio::test]
async fn removing_last_affiliation_deletes_doctor() {
    let f = fixture().await;
    f.service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap();

    let outcome = f.service.remove_affiliation(f.doctor_id, f.clinic_a).await.unwrap();
    assert_eq!(outcome, RemovalOutcome::Detached);

    let doctor = f.store.get_doctor(f.doctor_id).await.unwrap().unwrap();
    assert_eq!(doctor.clinics, vec![f.clinic_b]);
    assert!(doctor.schedule_for(f.clinic_a).is_none());
    assert!(doctor.fee_for(f.clinic_a).is_none());

    let outcome = f.service.remove_affiliation(f.doctor_id, f.clinic_b).await.unwrap();
    assert_eq!(outcome, RemovalOutcome::Deleted);
    assert_eq!(f.store.doctor_count().await, 0);
}

#[tokio::test]
async fn clinic_fee_is_replaced_and_validated() {
    let f = fixture().await;

    let doctor = f.service.set_clinic_fee(f.doctor_id, f.clinic_a, 750.0).await.unwrap();
    assert_eq!(doctor.fee_for(f.clinic_a), Some(750.0));
    assert_eq!(doctor.fee_for(f.clinic_b), Some(450.0));

    assert_matches!(
        f.service.set_clinic_fee(f.doctor_id, f.clinic_a, -5.0).await,
        Err(ScheduleError::Validation(_))
    );
}

#[tokio::test]
async fn resolve_slot_returns_stored_window() {
    let f = fixture().await;
    let entry = f
        .service
        .set_schedule(f.doctor_id, schedule(f.clinic_a, &[("Monday", "09:00", "12:00", 4)]))
        .await
        .unwrap()
        .unwrap();

    let resolved = f
        .service
        .resolve_slot(f.doctor_id, f.clinic_a, entry.schedule[0].id)
        .await
        .unwrap();
    assert_eq!(resolved.slot, entry.schedule[0]);
    assert_eq!(resolved.clinic.id, f.clinic_a);

    assert_matches!(
        f.service.resolve_slot(f.doctor_id, f.clinic_b, entry.schedule[0].id).await,
        Err(ScheduleError::NotFound(msg)) if msg == "Clinic schedule not found."
    );
    assert_matches!(
        f.service.resolve_slot(f.doctor_id, f.clinic_a, Uuid::new_v4()).await,
        Err(ScheduleError::NotFound(msg)) if msg == "Appointment schedule not found."
    );
}

//! Storage behaviour on PostgreSQL
//!
//! These need a server: `DATABASE_URL=postgres://... cargo test --test postgres_tests -- --ignored`.
//! Each test gets a fresh database with the crate's migrations applied.

mod common;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sqlx::PgPool;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::{office_default, schedule_input, wednesday_at};
use quickattendance_server::{
    models::{
        schedule::UpdateSchedule, Attendance, AttendanceFilter, AttendanceMethod, AttendanceStatus,
        AttendanceType, MarkAttendance, Role, ScheduleFilter,
    },
    repository::{AttendanceStore, Database, Repository, ScheduleStore},
    services::{clock::FixedClock, Services},
    AppError,
};

struct Seeded {
    agency_id: Uuid,
    alice: Uuid,
    bob: Uuid,
}

async fn seed(pool: &PgPool) -> Seeded {
    let agency_id = Uuid::new_v4();
    sqlx::query("INSERT INTO agencies (id, name) VALUES ($1, 'Acme')")
        .bind(agency_id)
        .execute(pool)
        .await
        .expect("Failed to insert agency");

    let mut ids = Vec::new();
    for name in ["alice", "bob"] {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, agency_id, email, first_name, role) VALUES ($1, $2, $3, $4, 'employee')",
        )
        .bind(id)
        .bind(agency_id)
        .bind(format!("{}@acme.test", name))
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to insert user");
        ids.push(id);
    }

    Seeded {
        agency_id,
        alice: ids[0],
        bob: ids[1],
    }
}

fn services(pool: &PgPool, now: DateTime<FixedOffset>) -> Services {
    Services::new(Arc::new(Repository::new(pool.clone())), Arc::new(FixedClock(now)))
}

fn check(seeded: &Seeded, user_id: Uuid, kind: AttendanceType) -> MarkAttendance {
    MarkAttendance {
        agency_id: seeded.agency_id,
        user_id,
        requester_role: Role::Employee,
        kind,
        method: AttendanceMethod::Qr,
        notes: None,
        is_remote: false,
        latitude: None,
        longitude: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn concurrent_promotions_both_succeed(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);
    let a = assert_ok!(svc.schedules.create(seeded.agency_id, &schedule_input("A", &[1], 540, 600, 0)).await);
    let b = assert_ok!(svc.schedules.create(seeded.agency_id, &schedule_input("B", &[2], 540, 600, 0)).await);

    let promote = UpdateSchedule {
        is_default: Some(true),
        ..Default::default()
    };
    let handles: Vec<_> = [a.id, b.id]
        .into_iter()
        .map(|id| {
            let schedules = svc.schedules.clone();
            let promote = promote.clone();
            let agency_id = seeded.agency_id;
            tokio::spawn(async move { schedules.update(id, agency_id, &promote).await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let filter = ScheduleFilter {
        is_default: Some(true),
        ..Default::default()
    };
    let defaults = assert_ok!(svc.schedules.list_by_agency(seeded.agency_id, &filter).await);
    assert_eq!(defaults.len(), 1);
    assert!(defaults[0].id == a.id || defaults[0].id == b.id);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn concurrent_overlapping_assignments_are_serialized(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 0));

    let handles: Vec<_> = ["Morning", "Evening"]
        .into_iter()
        .map(|name| {
            let schedules = svc.schedules.clone();
            let mut input = schedule_input(name, &[3], 540, 600, 0);
            input.assigned_user_ids = vec![seeded.alice];
            let agency_id = seeded.agency_id;
            tokio::spawn(async move { schedules.create(agency_id, &input).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::ScheduleOverlap(id)) => assert_eq!(id, seeded.alice),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn name_filter_is_a_literal_substring(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);
    assert_ok!(svc.schedules.create(seeded.agency_id, &schedule_input("Night", &[1], 1320, 360, 0)).await);

    for (needle, expected) in [("%", vec![]), ("N_ght", vec![]), ("NIG", vec!["Night"]), ("ff", vec!["Office"])] {
        let filter = ScheduleFilter {
            name: Some(needle.to_string()),
            ..Default::default()
        };
        let found = assert_ok!(svc.schedules.list_by_agency(seeded.agency_id, &filter).await);
        let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, expected, "filter {:?}", needle);
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn weekday_resolution_uses_the_stored_array(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 0));
    let default = assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);
    let mut early = schedule_input("Early", &[3], 420, 900, 5);
    early.assigned_user_ids = vec![seeded.alice];
    let early = assert_ok!(svc.schedules.create(seeded.agency_id, &early).await);

    let wed = wednesday_at(0, 0).date_naive();
    let resolved = assert_ok!(
        svc.schedules
            .resolve_applicable_schedule(seeded.agency_id, seeded.alice, wed)
            .await
    );
    assert_eq!(resolved.id, early.id);
    assert_eq!(resolved.assigned_user_ids, vec![seeded.alice]);

    let resolved = assert_ok!(
        svc.schedules
            .resolve_applicable_schedule(seeded.agency_id, seeded.bob, wed)
            .await
    );
    assert_eq!(resolved.id, default.id);

    let sat = wed + chrono::Duration::days(3);
    let err = assert_err!(
        svc.schedules
            .resolve_applicable_schedule(seeded.agency_id, seeded.alice, sat)
            .await
    );
    assert!(matches!(err, AppError::NoScheduleFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn schedule_constraints_map_to_conflicts(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 0));
    let office = assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);

    // Straight to the store, past the service checks
    let repository = Repository::new(pool.clone());
    let mut session = assert_ok!(repository.session().await);

    let mut duplicate = office.clone();
    duplicate.id = Uuid::new_v4();
    duplicate.is_default = false;
    let err = assert_err!(session.insert_schedule(&duplicate).await);
    assert!(matches!(err, AppError::ScheduleNameExists));

    duplicate.name = "Second".to_string();
    duplicate.is_default = true;
    let err = assert_err!(session.insert_schedule(&duplicate).await);
    assert!(matches!(err, AppError::DefaultScheduleExists));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn concurrent_check_ins_yield_a_single_record(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 5));
    assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let attendance = svc.attendance.clone();
            let req = check(&seeded, seeded.alice, AttendanceType::In);
            tokio::spawn(async move { attendance.mark(&req).await })
        })
        .collect();

    let (mut created, mut conflicts) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => {
                assert_eq!(record.status, AttendanceStatus::Present);
                created += 1;
            }
            Err(AppError::AttendanceExists) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((created, conflicts), (1, 3));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn duplicate_day_insert_maps_to_attendance_exists(pool: PgPool) {
    let seeded = seed(&pool).await;
    let svc = services(&pool, wednesday_at(9, 5));
    assert_ok!(svc.schedules.create(seeded.agency_id, &office_default()).await);
    let first = assert_ok!(svc.attendance.mark(&check(&seeded, seeded.alice, AttendanceType::In)).await);

    let repository = Repository::new(pool.clone());
    let mut session = assert_ok!(repository.session().await);
    let second = Attendance {
        id: Uuid::new_v4(),
        check_in_time: Utc::now(),
        ..first
    };
    let err = assert_err!(session.insert_attendance(&second).await);
    assert!(matches!(err, AppError::AttendanceExists));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn second_check_out_keeps_the_first(pool: PgPool) {
    let seeded = seed(&pool).await;
    let morning = services(&pool, wednesday_at(9, 5));
    assert_ok!(morning.schedules.create(seeded.agency_id, &office_default()).await);
    assert_ok!(morning.attendance.mark(&check(&seeded, seeded.alice, AttendanceType::In)).await);

    let evening = services(&pool, wednesday_at(18, 30));
    let closed = assert_ok!(evening.attendance.mark(&check(&seeded, seeded.alice, AttendanceType::Out)).await);
    assert_eq!(closed.check_out_time, Some(wednesday_at(18, 30).with_timezone(&Utc)));

    let later = services(&pool, wednesday_at(19, 0));
    let err = assert_err!(later.attendance.mark(&check(&seeded, seeded.alice, AttendanceType::Out)).await);
    assert!(matches!(err, AppError::AttendanceAlreadyClosed));

    // The conditional update refuses a stale close as well
    let repository = Repository::new(pool.clone());
    let mut session = assert_ok!(repository.session().await);
    let stale = Attendance {
        check_out_time: Some(Utc::now()),
        ..closed.clone()
    };
    let err = assert_err!(session.close_attendance(&stale).await);
    assert!(matches!(err, AppError::AttendanceAlreadyClosed));

    let records = assert_ok!(later.attendance.list(seeded.agency_id, &AttendanceFilter::default()).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].check_out_time, closed.check_out_time);
    assert_eq!(records[0].status, AttendanceStatus::Present);
}

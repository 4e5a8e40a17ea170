//! Attendance check-in/check-out flows through the in-memory backend

mod common;

use chrono::Utc;
use tokio_test::{assert_err, assert_ok};

use common::{agency, local, office_default, schedule_input, services, wednesday_at};
use quickattendance_server::{
    models::{
        AttendanceFilter, AttendanceMethod, AttendanceStatus, AttendanceType, MarkAttendance, Role,
        UserProfile,
    },
    AppError,
};

fn mark(user: &UserProfile, kind: AttendanceType, method: AttendanceMethod) -> MarkAttendance {
    MarkAttendance {
        agency_id: user.agency_id,
        user_id: user.id,
        requester_role: user.role,
        kind,
        method,
        notes: None,
        is_remote: false,
        latitude: None,
        longitude: None,
    }
}

#[tokio::test]
async fn wednesday_check_in_then_check_out() {
    let a = agency().await;
    assert_ok!(services(&a.db, wednesday_at(8, 0)).schedules.create(a.id, &office_default()).await);

    let morning = services(&a.db, wednesday_at(9, 5));
    let record = assert_ok!(
        morning
            .attendance
            .mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr))
            .await
    );
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.method_in, AttendanceMethod::Qr);
    assert_eq!(record.check_in_time, wednesday_at(9, 5).with_timezone(&Utc));
    assert_eq!(record.schedule_entry_time, wednesday_at(9, 0).with_timezone(&Utc));
    assert_eq!(record.schedule_exit_time, wednesday_at(17, 0).with_timezone(&Utc));
    assert!(record.check_out_time.is_none());

    let evening = services(&a.db, wednesday_at(18, 30));
    let closed = assert_ok!(
        evening
            .attendance
            .mark(&mark(&a.alice, AttendanceType::Out, AttendanceMethod::Qr))
            .await
    );
    assert_eq!(closed.id, record.id);
    assert_eq!(closed.check_out_time, Some(wednesday_at(18, 30).with_timezone(&Utc)));
    assert_eq!(closed.method_out, Some(AttendanceMethod::Qr));
    assert_eq!(closed.status, AttendanceStatus::Present);
}

#[tokio::test]
async fn check_in_after_grace_is_late() {
    let a = agency().await;
    assert_ok!(services(&a.db, wednesday_at(8, 0)).schedules.create(a.id, &office_default()).await);

    let svc = services(&a.db, wednesday_at(9, 16));
    let record = assert_ok!(
        svc.attendance
            .mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Nfc))
            .await
    );
    assert_eq!(record.status, AttendanceStatus::Late);

    // Exactly at the limit is still on time
    let svc = services(&a.db, wednesday_at(9, 15));
    let record = assert_ok!(
        svc.attendance
            .mark(&mark(&a.bob, AttendanceType::In, AttendanceMethod::Nfc))
            .await
    );
    assert_eq!(record.status, AttendanceStatus::Present);
}

#[tokio::test]
async fn second_check_in_and_check_out_fail() {
    let a = agency().await;
    let svc = services(&a.db, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    assert_ok!(svc.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    let err = assert_err!(svc.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    assert!(matches!(err, AppError::AttendanceExists));

    let first_out = services(&a.db, wednesday_at(17, 0));
    let closed = assert_ok!(
        first_out
            .attendance
            .mark(&mark(&a.alice, AttendanceType::Out, AttendanceMethod::Qr))
            .await
    );

    let second_out = services(&a.db, wednesday_at(19, 0));
    let err = assert_err!(
        second_out
            .attendance
            .mark(&mark(&a.alice, AttendanceType::Out, AttendanceMethod::Qr))
            .await
    );
    assert!(matches!(err, AppError::AttendanceAlreadyClosed));

    let records = assert_ok!(second_out.attendance.list(a.id, &AttendanceFilter::default()).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].check_out_time, closed.check_out_time);
}

#[tokio::test]
async fn check_out_without_check_in_fails() {
    let a = agency().await;
    let svc = services(&a.db, wednesday_at(17, 0));
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    let err = assert_err!(svc.attendance.mark(&mark(&a.alice, AttendanceType::Out, AttendanceMethod::Qr)).await);
    assert!(matches!(err, AppError::AttendanceNotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_check_ins_yield_a_single_record() {
    let a = agency().await;
    let svc = services(&a.db, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let attendance = svc.attendance.clone();
            let req = mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr);
            tokio::spawn(async move { attendance.mark(&req).await })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::AttendanceExists) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((created, conflicts), (1, 1));

    let records = assert_ok!(svc.attendance.list(a.id, &AttendanceFilter::default()).await);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn manual_marking_is_reserved_to_admins() {
    let a = agency().await;
    let svc = services(&a.db, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    let err = assert_err!(svc.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Manual)).await);
    assert!(matches!(err, AppError::ManualNotAllowed));

    // An admin marking on Alice's behalf
    let mut req = mark(&a.alice, AttendanceType::In, AttendanceMethod::Manual);
    req.requester_role = Role::Admin;
    let record = assert_ok!(svc.attendance.mark(&req).await);
    assert_eq!(record.user_id, a.alice.id);
    assert_eq!(record.method_in, AttendanceMethod::Manual);
}

#[tokio::test]
async fn remote_marking_checks_the_home_geofence() {
    let mut a = agency().await;
    let svc = services(&a.db, wednesday_at(9, 0));
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    let mut req = mark(&a.alice, AttendanceType::In, AttendanceMethod::Telework);
    req.is_remote = true;
    req.latitude = Some(40.4168);
    req.longitude = Some(-3.7038);

    let err = assert_err!(svc.attendance.mark(&req).await);
    assert!(matches!(err, AppError::HomeLocationNotSet));

    // Home in central Madrid with a 100 m radius
    a.alice.home_latitude = Some(40.4168);
    a.alice.home_longitude = Some(-3.7038);
    a.alice.home_radius_meters = Some(100);
    a.db.add_user(a.alice.clone()).await;

    let mut missing = req.clone();
    missing.longitude = None;
    let err = assert_err!(svc.attendance.mark(&missing).await);
    assert!(matches!(err, AppError::InvalidAttendance(_)));

    // About 500 m north
    let mut far = req.clone();
    far.latitude = Some(40.4213);
    let err = assert_err!(svc.attendance.mark(&far).await);
    match err {
        AppError::GeofenceViolation { distance_meters, radius_meters } => {
            assert_eq!(radius_meters, 100);
            assert!((distance_meters - 500.0).abs() < 10.0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let record = assert_ok!(svc.attendance.mark(&req).await);
    assert_eq!(record.latitude, Some(40.4168));
}

#[tokio::test]
async fn no_schedule_blocks_marking() {
    let a = agency().await;
    let saturday = local(2024, 6, 8, 9, 0);
    let svc = services(&a.db, saturday);
    assert_ok!(svc.schedules.create(a.id, &office_default()).await);

    let err = assert_err!(svc.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    assert!(matches!(err, AppError::NoScheduleFound));
}

#[tokio::test]
async fn overnight_shift_exit_lands_on_the_next_day() {
    let a = agency().await;
    let svc = services(&a.db, wednesday_at(22, 5));
    let mut night = schedule_input("Night", &[3], 1320, 360, 10);
    night.assigned_user_ids = vec![a.alice.id];
    assert_ok!(svc.schedules.create(a.id, &night).await);

    let record = assert_ok!(svc.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.schedule_exit_time, local(2024, 6, 6, 6, 0).with_timezone(&Utc));
}

#[tokio::test]
async fn listing_filters_by_user_status_and_dates() {
    let a = agency().await;
    let setup = services(&a.db, wednesday_at(8, 0));
    assert_ok!(setup.schedules.create(a.id, &office_default()).await);

    // Alice late on Tuesday, on time Wednesday; Bob on time Wednesday
    let tuesday = services(&a.db, local(2024, 6, 4, 9, 30));
    assert_ok!(tuesday.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    let wednesday = services(&a.db, wednesday_at(8, 55));
    assert_ok!(wednesday.attendance.mark(&mark(&a.alice, AttendanceType::In, AttendanceMethod::Qr)).await);
    assert_ok!(wednesday.attendance.mark(&mark(&a.bob, AttendanceType::In, AttendanceMethod::Qr)).await);

    let alice_only = AttendanceFilter {
        user_id: Some(a.alice.id),
        ..Default::default()
    };
    let records = assert_ok!(wednesday.attendance.list(a.id, &alice_only).await);
    assert_eq!(records.len(), 2);
    // Most recent day first
    assert!(records[0].date > records[1].date);

    let late = AttendanceFilter {
        status: Some(AttendanceStatus::Late),
        ..Default::default()
    };
    let records = assert_ok!(wednesday.attendance.list(a.id, &late).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, a.alice.id);

    let day = wednesday_at(0, 0).date_naive();
    let wednesday_only = AttendanceFilter {
        start_date: Some(day),
        end_date: Some(day),
        ..Default::default()
    };
    let records = assert_ok!(wednesday.attendance.list(a.id, &wednesday_only).await);
    assert_eq!(records.len(), 2);

    // Other agencies see nothing
    let other = agency().await;
    let records = assert_ok!(wednesday.attendance.list(other.id, &AttendanceFilter::default()).await);
    assert!(records.is_empty());
}

//! Attendance service: check-in/check-out transitions per (agency, user, day)
//!
//! A day goes `NoRecord -> CheckedIn -> CheckedOut`; the last state is
//! terminal. Punctuality is computed once at check-in against a snapshot of
//! the resolved schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{clock::Clock, geo, schedules::resolve_schedule};
use crate::{
    error::{AppError, AppResult},
    models::{
        schedule::ScheduleWindow, Attendance, AttendanceFilter, AttendanceMethod, AttendanceStatus,
        AttendanceType, MarkAttendance, Role, UserProfile,
    },
    repository::{AttendanceStore, Database, Transaction, UserStore},
};

/// `late` strictly after the grace limit, `present` otherwise
pub fn punctuality(check_in: DateTime<Utc>, window: &ScheduleWindow) -> AttendanceStatus {
    if check_in > window.late_limit {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Validate a remote marking against the user's home geofence
pub fn check_geofence(user: &UserProfile, latitude: Option<f64>, longitude: Option<f64>) -> AppResult<()> {
    let home = user.home_location().ok_or(AppError::HomeLocationNotSet)?;

    let (latitude, longitude) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(AppError::InvalidAttendance(
                "latitude and longitude are required for remote marking".to_string(),
            ))
        }
    };
    if !geo::is_valid_coordinate(latitude, longitude) {
        return Err(AppError::InvalidAttendance("coordinates out of range".to_string()));
    }

    let distance = geo::distance_meters(home.latitude, home.longitude, latitude, longitude);
    if distance > f64::from(home.radius_meters) {
        return Err(AppError::GeofenceViolation {
            distance_meters: distance,
            radius_meters: home.radius_meters,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct AttendanceService {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Check a user in or out for today
    pub async fn mark(&self, req: &MarkAttendance) -> AppResult<Attendance> {
        let now = self.clock.now();
        let today = now.date_naive();
        let now_utc = now.with_timezone(&Utc);

        let (schedule, user) = {
            let mut session = self.db.session().await?;
            let schedule = resolve_schedule(&mut *session, req.agency_id, req.user_id, today).await?;
            let user = session
                .user_by_id(req.user_id)
                .await?
                .filter(|u| u.agency_id == req.agency_id)
                .ok_or(AppError::UserNotFound)?;
            (schedule, user)
        };

        if req.method == AttendanceMethod::Manual && req.requester_role != Role::Admin {
            return Err(AppError::ManualNotAllowed);
        }
        if req.is_remote {
            check_geofence(&user, req.latitude, req.longitude)?;
        }

        let mut tx = self.db.begin().await?;
        let existing = tx.attendance_for_day(req.agency_id, req.user_id, today).await?;

        let attendance = match req.kind {
            AttendanceType::In => {
                if existing.is_some() {
                    return Err(AppError::AttendanceExists);
                }
                let window = schedule.window_on(today, now.offset())?;
                let attendance = Attendance {
                    id: Uuid::new_v4(),
                    user_id: req.user_id,
                    agency_id: req.agency_id,
                    date: today,
                    check_in_time: now_utc,
                    check_out_time: None,
                    schedule_entry_time: window.entry,
                    schedule_exit_time: window.exit,
                    status: punctuality(now_utc, &window),
                    method_in: req.method,
                    method_out: None,
                    notes: req.notes.clone(),
                    latitude: req.latitude,
                    longitude: req.longitude,
                    created_at: now_utc,
                    updated_at: now_utc,
                };
                tx.insert_attendance(&attendance).await?;
                attendance
            }
            AttendanceType::Out => {
                let mut attendance = existing.ok_or(AppError::AttendanceNotFound)?;
                if attendance.is_closed() {
                    return Err(AppError::AttendanceAlreadyClosed);
                }
                attendance.check_out_time = Some(now_utc);
                attendance.method_out = Some(req.method);
                attendance.updated_at = now_utc;
                tx.close_attendance(&attendance).await?;
                attendance
            }
        };

        tx.commit().await?;

        tracing::debug!(
            agency_id = %req.agency_id,
            user_id = %req.user_id,
            attendance_id = %attendance.id,
            kind = ?req.kind,
            status = %attendance.status,
            "attendance marked"
        );
        Ok(attendance)
    }

    /// List attendance of an agency; callers scope non-admins to their own id
    pub async fn list(&self, agency_id: Uuid, filter: &AttendanceFilter) -> AppResult<Vec<Attendance>> {
        let mut session = self.db.session().await?;
        session.list_attendance(agency_id, filter).await
    }
}

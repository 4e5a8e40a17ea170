//! Attendance models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    enums::{AttendanceMethod, AttendanceStatus, AttendanceType, Role},
    Pagination,
};

/// One user's attendance for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Attendance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agency_id: Uuid,
    /// Calendar day the record applies to
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    /// Absent until check-out; immutable once set
    pub check_out_time: Option<DateTime<Utc>>,
    /// Snapshot of the schedule entry time taken at check-in
    pub schedule_entry_time: DateTime<Utc>,
    /// Snapshot of the schedule exit time taken at check-in
    pub schedule_exit_time: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub method_in: AttendanceMethod,
    pub method_out: Option<AttendanceMethod>,
    pub notes: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attendance {
    pub fn is_closed(&self) -> bool {
        self.check_out_time.is_some()
    }
}

/// Mark attendance request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MarkAttendanceBody {
    /// Target user; admins only, employees always mark for themselves
    pub user_id: Option<Uuid>,
    pub method: AttendanceMethod,
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub notes: Option<String>,
    pub is_remote: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Fully resolved marking command handed to the attendance service
#[derive(Debug, Clone)]
pub struct MarkAttendance {
    pub agency_id: Uuid,
    pub user_id: Uuid,
    pub requester_role: Role,
    pub kind: AttendanceType,
    pub method: AttendanceMethod,
    pub notes: Option<String>,
    pub is_remote: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Query parameters for listing attendance
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct AttendanceQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<AttendanceStatus>,
    /// Inclusive start date (YYYY-MM-DD)
    pub start_date: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD)
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Storage-level attendance filter
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<AttendanceStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pagination: Pagination,
}

impl AttendanceFilter {
    pub fn matches(&self, attendance: &Attendance) -> bool {
        self.user_id.map_or(true, |u| attendance.user_id == u)
            && self.status.map_or(true, |s| attendance.status == s)
            && self.start_date.map_or(true, |d| attendance.date >= d)
            && self.end_date.map_or(true, |d| attendance.date <= d)
    }
}

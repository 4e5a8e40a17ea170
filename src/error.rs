//! Error types for QuickAttendance server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Coarse error families, used by callers to decide how to react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced entity absent or not owned by the caller's agency
    NotFound,
    /// Transition would violate a uniqueness invariant
    Conflict,
    /// Structurally disallowed for the caller or the entity state
    Forbidden,
    /// Malformed or incomplete request
    Validation,
    /// Well-formed request, but the user is not eligible right now
    Ineligible,
    Unauthorized,
    /// Storage or other infrastructure failure
    Infrastructure,
}

/// Stable numeric codes exposed in error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchUser = 4,
    NoSuchSchedule = 5,
    NoSuchAttendance = 6,
    NoSuchAgency = 7,
    Duplicate = 8,
    AttendanceClosed = 9,
    ScheduleOverlap = 10,
    ManualNotAllowed = 11,
    DefaultNotDeletable = 12,
    BadValue = 18,
    HomeLocationNotSet = 19,
    OutOfRange = 20,
    NoSchedule = 21,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Attendance not found")]
    AttendanceNotFound,

    #[error("Agency not found")]
    AgencyNotFound,

    #[error("Attendance already exists for this day")]
    AttendanceExists,

    #[error("Attendance already checked out")]
    AttendanceAlreadyClosed,

    #[error("Schedule name already exists")]
    ScheduleNameExists,

    #[error("Default schedule already exists")]
    DefaultScheduleExists,

    #[error("User {0} is already assigned to a schedule covering the same weekday")]
    ScheduleOverlap(uuid::Uuid),

    #[error("Only admins can mark attendance manually")]
    ManualNotAllowed,

    #[error("Cannot delete the default schedule of an agency")]
    CannotDeleteDefault,

    #[error("Invalid attendance data: {0}")]
    InvalidAttendance(String),

    #[error("Home location not set")]
    HomeLocationNotSet,

    #[error("Location out of range ({distance_meters:.0} m from home, allowed {radius_meters} m)")]
    GeofenceViolation { distance_meters: f64, radius_meters: i32 },

    #[error("No schedule found")]
    NoScheduleFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ScheduleNotFound
            | AppError::UserNotFound
            | AppError::AttendanceNotFound
            | AppError::AgencyNotFound => ErrorKind::NotFound,
            AppError::AttendanceExists
            | AppError::AttendanceAlreadyClosed
            | AppError::ScheduleNameExists
            | AppError::DefaultScheduleExists
            | AppError::ScheduleOverlap(_) => ErrorKind::Conflict,
            AppError::ManualNotAllowed
            | AppError::CannotDeleteDefault
            | AppError::Authorization(_) => ErrorKind::Forbidden,
            AppError::InvalidAttendance(_)
            | AppError::HomeLocationNotSet
            | AppError::Validation(_) => ErrorKind::Validation,
            AppError::GeofenceViolation { .. } | AppError::NoScheduleFound => ErrorKind::Ineligible,
            AppError::Authentication(_) => ErrorKind::Unauthorized,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            AppError::ScheduleNotFound => ErrorCode::NoSuchSchedule,
            AppError::UserNotFound => ErrorCode::NoSuchUser,
            AppError::AttendanceNotFound => ErrorCode::NoSuchAttendance,
            AppError::AgencyNotFound => ErrorCode::NoSuchAgency,
            AppError::AttendanceExists
            | AppError::ScheduleNameExists
            | AppError::DefaultScheduleExists => ErrorCode::Duplicate,
            AppError::AttendanceAlreadyClosed => ErrorCode::AttendanceClosed,
            AppError::ScheduleOverlap(_) => ErrorCode::ScheduleOverlap,
            AppError::ManualNotAllowed => ErrorCode::ManualNotAllowed,
            AppError::CannotDeleteDefault => ErrorCode::DefaultNotDeletable,
            AppError::InvalidAttendance(_) | AppError::Validation(_) => ErrorCode::BadValue,
            AppError::HomeLocationNotSet => ErrorCode::HomeLocationNotSet,
            AppError::GeofenceViolation { .. } => ErrorCode::OutOfRange,
            AppError::NoScheduleFound => ErrorCode::NoSchedule,
            AppError::Authentication(_) | AppError::Authorization(_) => ErrorCode::NotAuthorized,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Ineligible => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

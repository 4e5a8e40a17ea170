//! Attendance API endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        attendance::{AttendanceQuery, MarkAttendanceBody},
        Attendance, AttendanceFilter, MarkAttendance, Pagination,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Check in or out for today
#[utoipa::path(
    post,
    path = "/attendance",
    tag = "attendance",
    security(("bearer_auth" = [])),
    request_body = MarkAttendanceBody,
    responses(
        (status = 201, description = "Check-in recorded", body = Attendance),
        (status = 200, description = "Check-out recorded", body = Attendance),
        (status = 400, description = "Invalid coordinates", body = crate::error::ErrorResponse),
        (status = 403, description = "Method not allowed for the requester", body = crate::error::ErrorResponse),
        (status = 409, description = "Already checked in or out", body = crate::error::ErrorResponse),
        (status = 422, description = "No schedule, home location missing or outside geofence", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_attendance(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(body): Json<MarkAttendanceBody>,
) -> AppResult<(StatusCode, Json<Attendance>)> {
    // Employees always mark for themselves
    let user_id = if claims.is_admin() {
        body.user_id.unwrap_or(claims.sub)
    } else {
        claims.sub
    };

    let request = MarkAttendance {
        agency_id: claims.agency_id,
        user_id,
        requester_role: claims.role,
        kind: body.kind,
        method: body.method,
        notes: body.notes,
        is_remote: body.is_remote.unwrap_or(false),
        latitude: body.latitude,
        longitude: body.longitude,
    };

    let attendance = state.services.attendance.mark(&request).await?;
    let status = if attendance.is_closed() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(attendance)))
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/attendance",
    tag = "attendance",
    security(("bearer_auth" = [])),
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance records, most recent day first", body = Vec<Attendance>)
    )
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AttendanceQuery>,
) -> AppResult<Json<Vec<Attendance>>> {
    let limits = &state.config.attendance;
    let user_id = if claims.is_admin() { query.user_id } else { Some(claims.sub) };

    let filter = AttendanceFilter {
        user_id,
        status: query.status,
        start_date: query.start_date,
        end_date: query.end_date,
        pagination: Pagination::from_query(query.page, query.limit, limits.default_page_size, limits.max_page_size),
    };
    let records = state.services.attendance.list(claims.agency_id, &filter).await?;
    Ok(Json(records))
}

//! Schedule API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        schedule::{ApplicableScheduleQuery, CreateSchedule, ScheduleQuery, UpdateSchedule},
        Pagination, Schedule, ScheduleFilter,
    },
    AppState,
};

use super::AuthenticatedUser;

/// List schedules of the caller's agency
#[utoipa::path(
    get,
    path = "/schedules",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(ScheduleQuery),
    responses(
        (status = 200, description = "Schedules ordered by name", body = Vec<Schedule>)
    )
)]
pub async fn list_schedules(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Vec<Schedule>>> {
    let limits = &state.config.attendance;
    let filter = ScheduleFilter {
        name: query.name,
        is_default: query.is_default,
        pagination: Pagination::from_query(query.page, query.limit, limits.default_page_size, limits.max_page_size),
    };
    let schedules = state.services.schedules.list_by_agency(claims.agency_id, &filter).await?;
    Ok(Json(schedules))
}

/// Create a schedule
#[utoipa::path(
    post,
    path = "/schedules",
    tag = "schedules",
    security(("bearer_auth" = [])),
    request_body = CreateSchedule,
    responses(
        (status = 201, description = "Schedule created", body = Schedule),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorResponse),
        (status = 409, description = "Name, default or assignment conflict", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateSchedule>,
) -> AppResult<(StatusCode, Json<Schedule>)> {
    claims.require_admin()?;
    let schedule = state.services.schedules.create(claims.agency_id, &data).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Get a schedule by ID
#[utoipa::path(
    get,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule details", body = Schedule),
        (status = 404, description = "Schedule not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Schedule>> {
    let schedule = state.services.schedules.get(id, claims.agency_id).await?;
    Ok(Json(schedule))
}

/// Update a schedule
#[utoipa::path(
    put,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Schedule ID")),
    request_body = UpdateSchedule,
    responses(
        (status = 200, description = "Schedule updated", body = Schedule),
        (status = 404, description = "Schedule not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Name or assignment conflict", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_schedule(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateSchedule>,
) -> AppResult<Json<Schedule>> {
    claims.require_admin()?;
    let schedule = state.services.schedules.update(id, claims.agency_id, &data).await?;
    Ok(Json(schedule))
}

/// Delete a schedule
#[utoipa::path(
    delete,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 404, description = "Schedule not found", body = crate::error::ErrorResponse),
        (status = 403, description = "Schedule is the agency default", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;
    state.services.schedules.delete(id, claims.agency_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Schedule that applies to a user on a date
#[utoipa::path(
    get,
    path = "/schedules/applicable",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(ApplicableScheduleQuery),
    responses(
        (status = 200, description = "Applicable schedule", body = Schedule),
        (status = 422, description = "No schedule covers that day", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_applicable_schedule(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ApplicableScheduleQuery>,
) -> AppResult<Json<Schedule>> {
    let user_id = query.user_id.unwrap_or(claims.sub);
    if user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Authorization("Cannot look up another user's schedule".to_string()));
    }
    let schedule = state
        .services
        .schedules
        .resolve_applicable_schedule(claims.agency_id, user_id, query.date)
        .await?;
    Ok(Json(schedule))
}

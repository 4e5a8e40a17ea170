//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{attendance, health, schedules};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "QuickAttendance API",
        version = "1.0.0",
        description = "Schedules and daily attendance REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Schedules
        schedules::list_schedules,
        schedules::create_schedule,
        schedules::get_schedule,
        schedules::update_schedule,
        schedules::delete_schedule,
        schedules::get_applicable_schedule,
        // Attendance
        attendance::mark_attendance,
        attendance::list_attendance,
    ),
    components(
        schemas(
            // Schedules
            crate::models::schedule::Schedule,
            crate::models::schedule::CreateSchedule,
            crate::models::schedule::UpdateSchedule,
            crate::models::schedule::ScheduleQuery,
            crate::models::schedule::ApplicableScheduleQuery,
            // Attendance
            crate::models::attendance::Attendance,
            crate::models::attendance::MarkAttendanceBody,
            crate::models::attendance::AttendanceQuery,
            crate::models::enums::AttendanceStatus,
            crate::models::enums::AttendanceMethod,
            crate::models::enums::AttendanceType,
            crate::models::enums::Role,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "schedules", description = "Work schedule management"),
        (name = "attendance", description = "Daily check-in and check-out")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

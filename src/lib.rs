//! QuickAttendance server
//!
//! Multi-tenant attendance tracking: agencies define weekly work schedules,
//! employees check in and out once per day, and each check-in is classified
//! as `present` or `late` against the schedule that governs that day.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

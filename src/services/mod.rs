//! Business logic services

pub mod attendance;
pub mod clock;
pub mod geo;
pub mod schedules;

use std::sync::Arc;

use crate::repository::Database;
use clock::Clock;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub schedules: schedules::SchedulesService,
    pub attendance: attendance::AttendanceService,
}

impl Services {
    /// Create all services over the given storage backend
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedules: schedules::SchedulesService::new(db.clone()),
            attendance: attendance::AttendanceService::new(db, clock),
        }
    }
}

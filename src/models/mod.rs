//! Data models for QuickAttendance

pub mod attendance;
pub mod enums;
pub mod schedule;
pub mod user;

use serde::Deserialize;

// Re-export commonly used types
pub use attendance::{Attendance, AttendanceFilter, MarkAttendance};
pub use enums::{AttendanceMethod, AttendanceStatus, AttendanceType, Role};
pub use schedule::{Schedule, ScheduleFilter, WeekdaySet};
pub use user::{UserClaims, UserProfile};

/// Page/limit pair; a zero limit means "no limit" at the storage level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 0 }
    }
}

impl Pagination {
    /// Normalize raw query values: page at least 1, limit defaulted and capped
    pub fn from_query(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        let limit = match limit {
            Some(0) | None => default_limit,
            Some(l) => l,
        };
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.min(max_limit),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    /// Apply to an already filtered and ordered in-memory sequence
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.limit == 0 {
            return items;
        }
        items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect()
    }
}

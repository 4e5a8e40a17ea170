//! Schedule models (weekday coverage, time-of-day window, assignments)

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::Pagination;
use crate::error::{AppError, AppResult};

pub const MINUTES_PER_DAY: i32 = 24 * 60;

// ---------------------------------------------------------------------------
// WeekdaySet
// ---------------------------------------------------------------------------

/// Set of weekdays, 0=Sunday through 6=Saturday
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_days<I: IntoIterator<Item = u8>>(days: I) -> AppResult<Self> {
        let mut set = Self::empty();
        for day in days {
            if day > 6 {
                return Err(AppError::Validation(format!(
                    "Invalid weekday {} (expected 0=Sunday..6=Saturday)",
                    day
                )));
            }
            set.0 |= 1 << day;
        }
        Ok(set)
    }

    /// Weekday number of a calendar date
    pub fn weekday_of(date: NaiveDate) -> u8 {
        date.weekday().num_days_from_sunday() as u8
    }

    pub fn contains(&self, weekday: u8) -> bool {
        weekday <= 6 && self.0 & (1 << weekday) != 0
    }

    pub fn intersects(&self, other: &WeekdaySet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=6u8).filter(move |d| self.contains(*d))
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = AppError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

impl TryFrom<Vec<i16>> for WeekdaySet {
    type Error = AppError;

    fn try_from(days: Vec<i16>) -> Result<Self, Self::Error> {
        let days = days
            .into_iter()
            .map(|d| u8::try_from(d).map_err(|_| AppError::Validation(format!("Invalid weekday {}", d))))
            .collect::<AppResult<Vec<u8>>>()?;
        Self::from_days(days)
    }
}

impl From<WeekdaySet> for Vec<i16> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().map(i16::from).collect()
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A work schedule owned by one agency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: Uuid,
    pub agency_id: Uuid,
    /// Unique within the agency
    pub name: String,
    /// Covered weekdays (0=Sunday, 6=Saturday)
    #[schema(value_type = Vec<u8>)]
    pub days_of_week: WeekdaySet,
    /// Minutes since local midnight
    pub entry_time_minutes: i32,
    /// Minutes since local midnight
    pub exit_time_minutes: i32,
    pub grace_period_minutes: i32,
    pub is_default: bool,
    /// Users explicitly assigned to this schedule
    pub assigned_user_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `schedules` row; assignments are loaded separately
#[derive(Debug, FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub name: String,
    pub days_of_week: Vec<i16>,
    pub entry_time_minutes: i32,
    pub exit_time_minutes: i32,
    pub grace_period_minutes: i32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = AppError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: row.id,
            agency_id: row.agency_id,
            name: row.name,
            days_of_week: WeekdaySet::try_from(row.days_of_week)?,
            entry_time_minutes: row.entry_time_minutes,
            exit_time_minutes: row.exit_time_minutes,
            grace_period_minutes: row.grace_period_minutes,
            is_default: row.is_default,
            assigned_user_ids: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Scheduled entry and exit instants for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub entry: DateTime<Utc>,
    pub exit: DateTime<Utc>,
    /// Check-ins strictly after this instant are late
    pub late_limit: DateTime<Utc>,
}

impl Schedule {
    pub fn covers(&self, weekday: u8) -> bool {
        self.days_of_week.contains(weekday)
    }

    /// Combine `date` with the schedule's minute-of-day fields in `offset`.
    ///
    /// An exit time earlier than the entry time is an overnight shift and
    /// lands on the following day.
    pub fn window_on(&self, date: NaiveDate, offset: &FixedOffset) -> AppResult<ScheduleWindow> {
        let entry = local_instant(date, self.entry_time_minutes, offset)?;
        let mut exit = local_instant(date, self.exit_time_minutes, offset)?;
        if exit < entry {
            exit += Duration::days(1);
        }
        Ok(ScheduleWindow {
            entry,
            exit,
            late_limit: entry + Duration::minutes(i64::from(self.grace_period_minutes)),
        })
    }
}

fn local_instant(date: NaiveDate, minutes: i32, offset: &FixedOffset) -> AppResult<DateTime<Utc>> {
    let seconds = u32::try_from(minutes)
        .ok()
        .filter(|m| (*m as i32) < MINUTES_PER_DAY)
        .map(|m| m * 60)
        .ok_or_else(|| AppError::Internal(format!("Minute of day out of range: {}", minutes)))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
        .ok_or_else(|| AppError::Internal(format!("Minute of day out of range: {}", minutes)))?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::Internal(format!("Unrepresentable local time {} {}", date, time)))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Create schedule request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSchedule {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[schema(value_type = Vec<u8>)]
    pub days_of_week: WeekdaySet,
    #[validate(range(min = 0, max = 1439))]
    pub entry_time_minutes: i32,
    #[validate(range(min = 0, max = 1439))]
    pub exit_time_minutes: i32,
    #[validate(range(min = 0, max = 1439))]
    pub grace_period_minutes: i32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub assigned_user_ids: Vec<Uuid>,
}

/// Update schedule request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSchedule {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[schema(value_type = Option<Vec<u8>>)]
    pub days_of_week: Option<WeekdaySet>,
    #[validate(range(min = 0, max = 1439))]
    pub entry_time_minutes: Option<i32>,
    #[validate(range(min = 0, max = 1439))]
    pub exit_time_minutes: Option<i32>,
    #[validate(range(min = 0, max = 1439))]
    pub grace_period_minutes: Option<i32>,
    /// `true` promotes to default (demoting the previous one); `false` demotes
    pub is_default: Option<bool>,
    /// Replaces the full assignment set
    pub assigned_user_ids: Option<Vec<Uuid>>,
}

/// Query parameters for listing schedules
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ScheduleQuery {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    pub is_default: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Storage-level schedule filter
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub name: Option<String>,
    pub is_default: Option<bool>,
    pub pagination: Pagination,
}

impl ScheduleFilter {
    /// Whether `schedule` passes the name and default filters
    pub fn matches(&self, schedule: &Schedule) -> bool {
        let name_ok = self
            .name
            .as_ref()
            .map(|n| schedule.name.to_lowercase().contains(&n.to_lowercase()))
            .unwrap_or(true);
        let default_ok = self.is_default.map(|d| schedule.is_default == d).unwrap_or(true);
        name_ok && default_ok
    }
}

/// Query parameters for the applicable schedule lookup
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ApplicableScheduleQuery {
    /// Defaults to the caller
    pub user_id: Option<Uuid>,
    /// Date (YYYY-MM-DD)
    pub date: NaiveDate,
}

//! Schedules service: registry (lifecycle, default uniqueness, assignments)
//! and resolution of the schedule that governs a user on a date

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        schedule::{CreateSchedule, UpdateSchedule},
        Schedule, ScheduleFilter, WeekdaySet,
    },
    repository::{Database, ScheduleStore, Transaction, UserStore},
};

/// Schedule governing `user_id` on `date`.
///
/// A schedule explicitly assigned to the user and covering the weekday always
/// wins; otherwise the agency default applies if it covers the weekday.
pub async fn resolve_schedule<S>(
    store: &mut S,
    agency_id: Uuid,
    user_id: Uuid,
    date: NaiveDate,
) -> AppResult<Schedule>
where
    S: ScheduleStore + ?Sized,
{
    let weekday = WeekdaySet::weekday_of(date);

    if let Some(schedule) = store.user_schedule_for_weekday(agency_id, user_id, weekday).await? {
        tracing::debug!(%agency_id, %user_id, %date, schedule_id = %schedule.id, "resolved assigned schedule");
        return Ok(schedule);
    }

    match store.default_schedule(agency_id).await? {
        Some(schedule) if schedule.covers(weekday) => {
            tracing::debug!(%agency_id, %user_id, %date, schedule_id = %schedule.id, "resolved default schedule");
            Ok(schedule)
        }
        _ => Err(AppError::NoScheduleFound),
    }
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::Validation(err.to_string())
}

fn require_days(days: &WeekdaySet) -> AppResult<()> {
    if days.is_empty() {
        return Err(AppError::Validation("days_of_week must not be empty".to_string()));
    }
    Ok(())
}

/// Deduplicate and check every id names a user of `agency_id`
async fn agency_users<S>(store: &mut S, agency_id: Uuid, user_ids: &[Uuid]) -> AppResult<Vec<Uuid>>
where
    S: UserStore + ?Sized,
{
    let unique: BTreeSet<Uuid> = user_ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(Vec::new());
    }
    let members: HashSet<Uuid> = store
        .users_by_agency(agency_id)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();
    if !unique.iter().all(|id| members.contains(id)) {
        return Err(AppError::UserNotFound);
    }
    Ok(unique.into_iter().collect())
}

async fn ensure_no_overlap<S>(
    store: &mut S,
    agency_id: Uuid,
    exclude_schedule_id: Option<Uuid>,
    user_ids: &[Uuid],
    days: WeekdaySet,
) -> AppResult<()>
where
    S: ScheduleStore + ?Sized,
{
    let overlapping = store
        .overlapping_assignments(agency_id, exclude_schedule_id, user_ids, days)
        .await?;
    match overlapping.first() {
        Some(user_id) => Err(AppError::ScheduleOverlap(*user_id)),
        None => Ok(()),
    }
}

#[derive(Clone)]
pub struct SchedulesService {
    db: Arc<dyn Database>,
}

impl SchedulesService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Create a schedule for an agency
    pub async fn create(&self, agency_id: Uuid, data: &CreateSchedule) -> AppResult<Schedule> {
        data.validate().map_err(validation_error)?;
        require_days(&data.days_of_week)?;

        let mut tx = self.db.begin().await?;

        if !tx.lock_agency(agency_id).await? {
            return Err(AppError::AgencyNotFound);
        }
        if tx.schedule_by_name(agency_id, &data.name).await?.is_some() {
            return Err(AppError::ScheduleNameExists);
        }
        if data.is_default && tx.default_schedule(agency_id).await?.is_some() {
            return Err(AppError::DefaultScheduleExists);
        }

        let assigned_user_ids = agency_users(&mut *tx, agency_id, &data.assigned_user_ids).await?;
        ensure_no_overlap(&mut *tx, agency_id, None, &assigned_user_ids, data.days_of_week).await?;

        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            agency_id,
            name: data.name.clone(),
            days_of_week: data.days_of_week,
            entry_time_minutes: data.entry_time_minutes,
            exit_time_minutes: data.exit_time_minutes,
            grace_period_minutes: data.grace_period_minutes,
            is_default: data.is_default,
            assigned_user_ids,
            created_at: now,
            updated_at: now,
        };

        tx.insert_schedule(&schedule).await?;
        tx.commit().await?;

        tracing::debug!(%agency_id, schedule_id = %schedule.id, "schedule created");
        Ok(schedule)
    }

    /// Get a schedule owned by `agency_id`
    pub async fn get(&self, schedule_id: Uuid, agency_id: Uuid) -> AppResult<Schedule> {
        let mut session = self.db.session().await?;
        session
            .schedule_by_id(schedule_id)
            .await?
            .filter(|s| s.agency_id == agency_id)
            .ok_or(AppError::ScheduleNotFound)
    }

    /// Apply a partial update.
    ///
    /// Promoting to default demotes the agency's current default inside the
    /// same transaction.
    pub async fn update(&self, schedule_id: Uuid, agency_id: Uuid, data: &UpdateSchedule) -> AppResult<Schedule> {
        data.validate().map_err(validation_error)?;
        if let Some(ref days) = data.days_of_week {
            require_days(days)?;
        }

        let mut tx = self.db.begin().await?;
        if !tx.lock_agency(agency_id).await? {
            return Err(AppError::ScheduleNotFound);
        }

        let mut schedule = tx
            .schedule_by_id(schedule_id)
            .await?
            .filter(|s| s.agency_id == agency_id)
            .ok_or(AppError::ScheduleNotFound)?;
        let now = Utc::now();

        if let Some(ref name) = data.name {
            if let Some(other) = tx.schedule_by_name(agency_id, name).await? {
                if other.id != schedule_id {
                    return Err(AppError::ScheduleNameExists);
                }
            }
            schedule.name = name.clone();
        }

        match data.is_default {
            Some(true) if !schedule.is_default => {
                if let Some(mut current) = tx.default_schedule(agency_id).await? {
                    current.is_default = false;
                    current.updated_at = now;
                    tx.update_schedule(&current).await?;
                    tracing::debug!(%agency_id, schedule_id = %current.id, "default schedule demoted");
                }
                schedule.is_default = true;
            }
            Some(false) => schedule.is_default = false,
            _ => {}
        }

        if let Some(days) = data.days_of_week {
            schedule.days_of_week = days;
        }
        if let Some(entry) = data.entry_time_minutes {
            schedule.entry_time_minutes = entry;
        }
        if let Some(exit) = data.exit_time_minutes {
            schedule.exit_time_minutes = exit;
        }
        if let Some(grace) = data.grace_period_minutes {
            schedule.grace_period_minutes = grace;
        }
        if let Some(ref user_ids) = data.assigned_user_ids {
            schedule.assigned_user_ids = agency_users(&mut *tx, agency_id, user_ids).await?;
        }

        if data.days_of_week.is_some() || data.assigned_user_ids.is_some() {
            ensure_no_overlap(
                &mut *tx,
                agency_id,
                Some(schedule_id),
                &schedule.assigned_user_ids,
                schedule.days_of_week,
            )
            .await?;
        }

        schedule.updated_at = now;
        tx.update_schedule(&schedule).await?;
        tx.commit().await?;

        Ok(schedule)
    }

    /// Delete a non-default schedule
    pub async fn delete(&self, schedule_id: Uuid, agency_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        if !tx.lock_agency(agency_id).await? {
            return Err(AppError::ScheduleNotFound);
        }

        let schedule = tx
            .schedule_by_id(schedule_id)
            .await?
            .filter(|s| s.agency_id == agency_id)
            .ok_or(AppError::ScheduleNotFound)?;
        if schedule.is_default {
            return Err(AppError::CannotDeleteDefault);
        }

        tx.delete_schedule(schedule_id).await?;
        tx.commit().await
    }

    pub async fn get_default(&self, agency_id: Uuid) -> AppResult<Option<Schedule>> {
        let mut session = self.db.session().await?;
        session.default_schedule(agency_id).await
    }

    /// Schedule explicitly assigned to the user for `weekday` (0=Sunday)
    pub async fn get_user_schedule_for_weekday(
        &self,
        agency_id: Uuid,
        user_id: Uuid,
        weekday: u8,
    ) -> AppResult<Option<Schedule>> {
        let mut session = self.db.session().await?;
        session.user_schedule_for_weekday(agency_id, user_id, weekday).await
    }

    pub async fn list_by_agency(&self, agency_id: Uuid, filter: &ScheduleFilter) -> AppResult<Vec<Schedule>> {
        let mut session = self.db.session().await?;
        session.list_schedules(agency_id, filter).await
    }

    /// Schedule that applies to `user_id` on `date`, or `NoScheduleFound`
    pub async fn resolve_applicable_schedule(
        &self,
        agency_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Schedule> {
        let mut session = self.db.session().await?;
        resolve_schedule(&mut *session, agency_id, user_id, date).await
    }
}

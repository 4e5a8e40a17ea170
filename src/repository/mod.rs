//! Repository layer for database operations
//!
//! Every storage call takes an explicit handle: either a [`Session`] on the
//! ambient connection or a [`Transaction`]. Dropping a transaction without
//! calling [`Transaction::commit`] rolls back every write made through it.

pub mod attendance;
pub mod memory;
pub mod schedules;
pub mod users;

use std::ops::DerefMut;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    config::DatabaseConfig,
    error::AppResult,
    models::{Attendance, AttendanceFilter, Schedule, ScheduleFilter, UserProfile, WeekdaySet},
};

/// Schedule persistence
#[async_trait]
pub trait ScheduleStore: Send {
    /// Schedule with its assigned users
    async fn schedule_by_id(&mut self, id: Uuid) -> AppResult<Option<Schedule>>;

    async fn schedule_by_name(&mut self, agency_id: Uuid, name: &str) -> AppResult<Option<Schedule>>;

    /// Plain read; writers serialize through [`UserStore::lock_agency`]
    async fn default_schedule(&mut self, agency_id: Uuid) -> AppResult<Option<Schedule>>;

    /// Schedule explicitly assigned to `user_id` covering `weekday`.
    /// Ties resolve to the most recently created schedule.
    async fn user_schedule_for_weekday(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        weekday: u8,
    ) -> AppResult<Option<Schedule>>;

    /// Users among `user_ids` already assigned to another schedule of the
    /// agency that shares a weekday with `days`
    async fn overlapping_assignments(
        &mut self,
        agency_id: Uuid,
        exclude_schedule_id: Option<Uuid>,
        user_ids: &[Uuid],
        days: WeekdaySet,
    ) -> AppResult<Vec<Uuid>>;

    async fn list_schedules(&mut self, agency_id: Uuid, filter: &ScheduleFilter) -> AppResult<Vec<Schedule>>;

    /// Insert the schedule row and its assignments
    async fn insert_schedule(&mut self, schedule: &Schedule) -> AppResult<()>;

    /// Overwrite the schedule row and replace its assignments
    async fn update_schedule(&mut self, schedule: &Schedule) -> AppResult<()>;

    async fn delete_schedule(&mut self, id: Uuid) -> AppResult<()>;
}

/// Read-only access to accounts owned by another service
#[async_trait]
pub trait UserStore: Send {
    async fn user_by_id(&mut self, id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn users_by_agency(&mut self, agency_id: Uuid) -> AppResult<Vec<UserProfile>>;

    /// Lock the agency row until the transaction ends; `false` if the agency
    /// does not exist. Every schedule write takes this lock first, so writes
    /// within one agency run one at a time.
    async fn lock_agency(&mut self, agency_id: Uuid) -> AppResult<bool>;
}

/// Attendance persistence
#[async_trait]
pub trait AttendanceStore: Send {
    /// Record for (agency, user, date), locked for update inside a transaction
    async fn attendance_for_day(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<Attendance>>;

    /// Fails with `AttendanceExists` if the (agency, user, date) key is taken
    async fn insert_attendance(&mut self, attendance: &Attendance) -> AppResult<()>;

    /// Persist a check-out; fails with `AttendanceAlreadyClosed` if the
    /// stored record already has one
    async fn close_attendance(&mut self, attendance: &Attendance) -> AppResult<()>;

    async fn list_attendance(&mut self, agency_id: Uuid, filter: &AttendanceFilter) -> AppResult<Vec<Attendance>>;
}

/// Handle usable for every store
pub trait Session: ScheduleStore + UserStore + AttendanceStore {}

impl<T: ScheduleStore + UserStore + AttendanceStore> Session for T {}

#[async_trait]
pub trait Transaction: Session {
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Source of sessions and transactions
#[async_trait]
pub trait Database: Send + Sync {
    /// Session on the ambient connection (autocommit)
    async fn session(&self) -> AppResult<Box<dyn Session>>;

    async fn begin(&self) -> AppResult<Box<dyn Transaction>>;
}

/// PostgreSQL handle over any connection-like value (pooled connection or transaction)
pub struct PgSession<C> {
    conn: C,
}

impl<C> PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl Transaction for PgSession<sqlx::Transaction<'static, Postgres>> {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let session = *self;
        session.conn.commit().await?;
        Ok(())
    }
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Database for Repository {
    async fn session(&self) -> AppResult<Box<dyn Session>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession { conn }))
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let conn = self.pool.begin().await?;
        Ok(Box::new(PgSession { conn }))
    }
}

/// Name of the violated constraint when `err` is a unique violation
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

//! Schedule persistence on PostgreSQL

use std::collections::HashMap;
use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{unique_violation, PgSession, ScheduleStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        schedule::{ScheduleRow, WeekdaySet},
        Schedule, ScheduleFilter,
    },
};

const SELECT_SCHEDULE: &str = r#"
    SELECT s.id, s.agency_id, s.name, s.days_of_week, s.entry_time_minutes,
           s.exit_time_minutes, s.grace_period_minutes, s.is_default,
           s.created_at, s.updated_at
    FROM schedules s
"#;

fn map_write_error(err: sqlx::Error) -> AppError {
    match unique_violation(&err).as_deref() {
        Some("schedules_agency_name_key") => AppError::ScheduleNameExists,
        Some("schedules_one_default_per_agency") => AppError::DefaultScheduleExists,
        _ => AppError::Database(err),
    }
}

impl<C> PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    /// Attach assignments to a batch of rows, preserving row order
    async fn with_assignments(&mut self, rows: Vec<ScheduleRow>) -> AppResult<Vec<Schedule>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let pairs: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT schedule_id, user_id FROM schedule_users WHERE schedule_id = ANY($1) ORDER BY user_id",
        )
        .bind(&ids)
        .fetch_all(self.conn())
        .await?;

        let mut by_schedule: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (schedule_id, user_id) in pairs {
            by_schedule.entry(schedule_id).or_default().push(user_id);
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                let mut schedule = Schedule::try_from(row)?;
                schedule.assigned_user_ids = by_schedule.remove(&id).unwrap_or_default();
                Ok(schedule)
            })
            .collect()
    }

    async fn first_with_assignments(&mut self, row: Option<ScheduleRow>) -> AppResult<Option<Schedule>> {
        match row {
            Some(row) => Ok(self.with_assignments(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn replace_assignments(&mut self, schedule_id: Uuid, user_ids: &[Uuid]) -> AppResult<()> {
        sqlx::query("DELETE FROM schedule_users WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(self.conn())
            .await?;
        if !user_ids.is_empty() {
            sqlx::query(
                "INSERT INTO schedule_users (schedule_id, user_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
            )
            .bind(schedule_id)
            .bind(user_ids)
            .execute(self.conn())
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C> ScheduleStore for PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn schedule_by_id(&mut self, id: Uuid) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!("{SELECT_SCHEDULE} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(self.conn())
            .await?;
        self.first_with_assignments(row).await
    }

    async fn schedule_by_name(&mut self, agency_id: Uuid, name: &str) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "{SELECT_SCHEDULE} WHERE s.agency_id = $1 AND s.name = $2"
        ))
        .bind(agency_id)
        .bind(name)
        .fetch_optional(self.conn())
        .await?;
        self.first_with_assignments(row).await
    }

    async fn default_schedule(&mut self, agency_id: Uuid) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "{SELECT_SCHEDULE} WHERE s.agency_id = $1 AND s.is_default"
        ))
        .bind(agency_id)
        .fetch_optional(self.conn())
        .await?;
        self.first_with_assignments(row).await
    }

    async fn user_schedule_for_weekday(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        weekday: u8,
    ) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            r#"{SELECT_SCHEDULE}
            JOIN schedule_users su ON su.schedule_id = s.id
            WHERE s.agency_id = $1 AND su.user_id = $2 AND $3::smallint = ANY(s.days_of_week)
            ORDER BY s.created_at DESC, s.id
            LIMIT 1"#
        ))
        .bind(agency_id)
        .bind(user_id)
        .bind(i16::from(weekday))
        .fetch_optional(self.conn())
        .await?;
        self.first_with_assignments(row).await
    }

    async fn overlapping_assignments(
        &mut self,
        agency_id: Uuid,
        exclude_schedule_id: Option<Uuid>,
        user_ids: &[Uuid],
        days: WeekdaySet,
    ) -> AppResult<Vec<Uuid>> {
        if user_ids.is_empty() || days.is_empty() {
            return Ok(Vec::new());
        }
        let days: Vec<i16> = days.into();
        let rows = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT su.user_id
            FROM schedule_users su
            JOIN schedules s ON s.id = su.schedule_id
            WHERE s.agency_id = $1
              AND su.user_id = ANY($2)
              AND s.days_of_week && $3::smallint[]
              AND ($4::uuid IS NULL OR s.id <> $4)
            ORDER BY su.user_id
            "#,
        )
        .bind(agency_id)
        .bind(user_ids)
        .bind(&days)
        .bind(exclude_schedule_id)
        .fetch_all(self.conn())
        .await?;
        Ok(rows)
    }

    async fn list_schedules(&mut self, agency_id: Uuid, filter: &ScheduleFilter) -> AppResult<Vec<Schedule>> {
        let mut conditions = vec!["s.agency_id = $1".to_string()];
        let mut idx = 2;

        if filter.name.is_some() {
            // Literal match: `%` and `_` in the filter are not wildcards
            conditions.push(format!("strpos(lower(s.name), lower(${})) > 0", idx));
            idx += 1;
        }
        if filter.is_default.is_some() {
            conditions.push(format!("s.is_default = ${}", idx));
        }

        let mut query = format!(
            "{SELECT_SCHEDULE} WHERE {} ORDER BY s.name, s.id",
            conditions.join(" AND ")
        );
        let page = filter.pagination;
        if page.limit > 0 {
            query.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset()));
        }

        let mut builder = sqlx::query_as::<_, ScheduleRow>(&query).bind(agency_id);
        if let Some(ref name) = filter.name {
            builder = builder.bind(name);
        }
        if let Some(is_default) = filter.is_default {
            builder = builder.bind(is_default);
        }

        let rows = builder.fetch_all(self.conn()).await?;
        self.with_assignments(rows).await
    }

    async fn insert_schedule(&mut self, schedule: &Schedule) -> AppResult<()> {
        let days: Vec<i16> = schedule.days_of_week.into();
        sqlx::query(
            r#"
            INSERT INTO schedules (id, agency_id, name, days_of_week, entry_time_minutes,
                                   exit_time_minutes, grace_period_minutes, is_default,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.agency_id)
        .bind(&schedule.name)
        .bind(&days)
        .bind(schedule.entry_time_minutes)
        .bind(schedule.exit_time_minutes)
        .bind(schedule.grace_period_minutes)
        .bind(schedule.is_default)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(self.conn())
        .await
        .map_err(map_write_error)?;

        self.replace_assignments(schedule.id, &schedule.assigned_user_ids).await
    }

    async fn update_schedule(&mut self, schedule: &Schedule) -> AppResult<()> {
        let days: Vec<i16> = schedule.days_of_week.into();
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET name = $2, days_of_week = $3, entry_time_minutes = $4, exit_time_minutes = $5,
                grace_period_minutes = $6, is_default = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.name)
        .bind(&days)
        .bind(schedule.entry_time_minutes)
        .bind(schedule.exit_time_minutes)
        .bind(schedule.grace_period_minutes)
        .bind(schedule.is_default)
        .bind(schedule.updated_at)
        .execute(self.conn())
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::ScheduleNotFound);
        }
        self.replace_assignments(schedule.id, &schedule.assigned_user_ids).await
    }

    async fn delete_schedule(&mut self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(self.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::ScheduleNotFound);
        }
        Ok(())
    }
}

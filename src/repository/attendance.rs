//! Attendance persistence on PostgreSQL

use std::ops::DerefMut;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{unique_violation, AttendanceStore, PgSession};
use crate::{
    error::{AppError, AppResult},
    models::{Attendance, AttendanceFilter},
};

#[async_trait]
impl<C> AttendanceStore for PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn attendance_for_day(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<Attendance>> {
        let row = sqlx::query_as::<_, Attendance>(
            r#"
            SELECT * FROM attendances
            WHERE agency_id = $1 AND user_id = $2 AND date = $3
            FOR UPDATE
            "#,
        )
        .bind(agency_id)
        .bind(user_id)
        .bind(date)
        .fetch_optional(self.conn())
        .await?;
        Ok(row)
    }

    async fn insert_attendance(&mut self, attendance: &Attendance) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendances (id, agency_id, user_id, date, check_in_time, check_out_time,
                                     schedule_entry_time, schedule_exit_time, status,
                                     method_in, method_out, notes, latitude, longitude,
                                     created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(attendance.id)
        .bind(attendance.agency_id)
        .bind(attendance.user_id)
        .bind(attendance.date)
        .bind(attendance.check_in_time)
        .bind(attendance.check_out_time)
        .bind(attendance.schedule_entry_time)
        .bind(attendance.schedule_exit_time)
        .bind(attendance.status)
        .bind(attendance.method_in)
        .bind(attendance.method_out)
        .bind(&attendance.notes)
        .bind(attendance.latitude)
        .bind(attendance.longitude)
        .bind(attendance.created_at)
        .bind(attendance.updated_at)
        .execute(self.conn())
        .await
        .map_err(|err| match unique_violation(&err).as_deref() {
            Some("attendances_agency_user_date_key") => AppError::AttendanceExists,
            _ => AppError::Database(err),
        })?;
        Ok(())
    }

    async fn close_attendance(&mut self, attendance: &Attendance) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE attendances
            SET check_out_time = $2, method_out = $3, updated_at = $4
            WHERE id = $1 AND check_out_time IS NULL
            "#,
        )
        .bind(attendance.id)
        .bind(attendance.check_out_time)
        .bind(attendance.method_out)
        .bind(attendance.updated_at)
        .execute(self.conn())
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM attendances WHERE id = $1)")
                .bind(attendance.id)
                .fetch_one(self.conn())
                .await?;
            return Err(if exists {
                AppError::AttendanceAlreadyClosed
            } else {
                AppError::AttendanceNotFound
            });
        }
        Ok(())
    }

    async fn list_attendance(&mut self, agency_id: Uuid, filter: &AttendanceFilter) -> AppResult<Vec<Attendance>> {
        let mut conditions = vec!["agency_id = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_condition {
            ($field:expr, $clause:expr) => {
                if $field.is_some() {
                    conditions.push(format!($clause, idx));
                    idx += 1;
                }
            };
        }

        add_condition!(filter.user_id, "user_id = ${}");
        add_condition!(filter.status, "status = ${}");
        add_condition!(filter.start_date, "date >= ${}");
        add_condition!(filter.end_date, "date <= ${}");

        let mut query = format!(
            "SELECT * FROM attendances WHERE {} ORDER BY date DESC, check_in_time DESC",
            conditions.join(" AND ")
        );
        let page = filter.pagination;
        if page.limit > 0 {
            query.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset()));
        }

        let mut builder = sqlx::query_as::<_, Attendance>(&query).bind(agency_id);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(filter.user_id);
        bind_field!(filter.status);
        bind_field!(filter.start_date);
        bind_field!(filter.end_date);

        let rows = builder.fetch_all(self.conn()).await?;
        Ok(rows)
    }
}

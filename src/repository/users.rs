//! User lookups on PostgreSQL (accounts are owned by another service)

use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{PgSession, UserStore};
use crate::{error::AppResult, models::UserProfile};

const SELECT_USER: &str = r#"
    SELECT id, agency_id, role, home_latitude, home_longitude, home_radius_meters
    FROM users
"#;

#[async_trait]
impl<C> UserStore for PgSession<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn user_by_id(&mut self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.conn())
            .await?;
        Ok(user)
    }

    async fn users_by_agency(&mut self, agency_id: Uuid) -> AppResult<Vec<UserProfile>> {
        let users = sqlx::query_as::<_, UserProfile>(&format!(
            "{SELECT_USER} WHERE agency_id = $1 ORDER BY id"
        ))
        .bind(agency_id)
        .fetch_all(self.conn())
        .await?;
        Ok(users)
    }

    async fn lock_agency(&mut self, agency_id: Uuid) -> AppResult<bool> {
        let row: Option<Uuid> = sqlx::query_scalar("SELECT id FROM agencies WHERE id = $1 FOR UPDATE")
            .bind(agency_id)
            .fetch_optional(self.conn())
            .await?;
        Ok(row.is_some())
    }
}

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, ViewsRepo};
use crate::domain::entities::View;
use crate::domain::types::SessionId;

use super::util::stored_session;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ViewRow {
    id: Uuid,
    slug: String,
    timestamp: OffsetDateTime,
    session_id: String,
    user_agent: Option<String>,
}

impl TryFrom<ViewRow> for View {
    type Error = RepoError;

    fn try_from(row: ViewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            slug: row.slug,
            timestamp: row.timestamp,
            session_id: stored_session(&row.session_id)?,
            user_agent: row.user_agent,
        })
    }
}

fn into_views(rows: Vec<ViewRow>) -> Result<Vec<View>, RepoError> {
    rows.into_iter().map(View::try_from).collect()
}

#[async_trait]
impl ViewsRepo for PostgresRepositories {
    async fn insert_view(&self, view: &View) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO views (id, slug, timestamp, session_id, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(view.id)
        .bind(&view.slug)
        .bind(view.timestamp)
        .bind(view.session_id.as_str())
        .bind(view.user_agent.as_deref())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_views(&self) -> Result<Vec<View>, RepoError> {
        let rows = sqlx::query_as::<_, ViewRow>(
            r#"
            SELECT id, slug, timestamp, session_id, user_agent
            FROM views
            ORDER BY timestamp DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_views(rows)
    }

    async fn list_views_by_slug(&self, slug: &str) -> Result<Vec<View>, RepoError> {
        let rows = sqlx::query_as::<_, ViewRow>(
            r#"
            SELECT id, slug, timestamp, session_id, user_agent
            FROM views
            WHERE slug = $1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(slug)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_views(rows)
    }

    async fn view_exists_since(
        &self,
        session: &SessionId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM views
                WHERE session_id = $1 AND slug = $2 AND timestamp > $3
            )
            "#,
        )
        .bind(session.as_str())
        .bind(slug)
        .bind(since)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn delete_all_views(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM views")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

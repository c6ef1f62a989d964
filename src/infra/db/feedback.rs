use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{FeedbackRepo, RepoError};
use crate::domain::entities::Feedback;
use crate::domain::types::Rating;

use super::util::stored_session;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: Uuid,
    slug: String,
    rating: i16,
    timestamp: OffsetDateTime,
    session_id: String,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = RepoError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let rating = Rating::try_from(i64::from(row.rating))
            .map_err(|err| RepoError::integrity(err.to_string()))?;
        Ok(Self {
            id: row.id,
            slug: row.slug,
            rating,
            timestamp: row.timestamp,
            session_id: stored_session(&row.session_id)?,
        })
    }
}

fn into_feedback(rows: Vec<FeedbackRow>) -> Result<Vec<Feedback>, RepoError> {
    rows.into_iter().map(Feedback::try_from).collect()
}

#[async_trait]
impl FeedbackRepo for PostgresRepositories {
    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, slug, rating, timestamp, session_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(feedback.id)
        .bind(&feedback.slug)
        .bind(i16::from(feedback.rating.get()))
        .bind(feedback.timestamp)
        .bind(feedback.session_id.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>, RepoError> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            r#"
            SELECT id, slug, rating, timestamp, session_id
            FROM feedback
            ORDER BY timestamp DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_feedback(rows)
    }

    async fn list_feedback_by_slug(&self, slug: &str) -> Result<Vec<Feedback>, RepoError> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            r#"
            SELECT id, slug, rating, timestamp, session_id
            FROM feedback
            WHERE slug = $1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(slug)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_feedback(rows)
    }

    async fn delete_all_feedback(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM feedback")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ReadingAnalyticsRepo, RepoError};
use crate::domain::entities::ReadingAnalytics;
use crate::domain::types::{Milestones, ScrollPercent};

use super::util::{narrow, stored_session};
use super::{PostgresRepositories, map_sqlx_error};

const READING_COLUMNS: &str = "id, slug, session_id, timestamp, max_scroll_depth, \
     reached_25, reached_50, reached_75, reached_100, time_on_page, exit_scroll_position, \
     user_agent";

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: Uuid,
    slug: String,
    session_id: String,
    timestamp: OffsetDateTime,
    max_scroll_depth: i16,
    reached_25: bool,
    reached_50: bool,
    reached_75: bool,
    reached_100: bool,
    time_on_page: i64,
    exit_scroll_position: i16,
    user_agent: Option<String>,
}

fn stored_percent(column: &'static str, value: i16) -> Result<ScrollPercent, RepoError> {
    let narrowed: u8 = narrow(column, value)?;
    ScrollPercent::new(narrowed).map_err(|err| RepoError::integrity(err.to_string()))
}

impl TryFrom<ReadingRow> for ReadingAnalytics {
    type Error = RepoError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        let max_scroll_depth = stored_percent("max_scroll_depth", row.max_scroll_depth)?;
        let milestones = Milestones::from_stored(
            max_scroll_depth,
            [row.reached_25, row.reached_50, row.reached_75, row.reached_100],
        )
        .map_err(|err| RepoError::integrity(err.to_string()))?;

        Ok(Self {
            id: row.id,
            slug: row.slug,
            session_id: stored_session(&row.session_id)?,
            timestamp: row.timestamp,
            max_scroll_depth,
            milestones,
            time_on_page: narrow("time_on_page", row.time_on_page)?,
            exit_scroll_position: stored_percent("exit_scroll_position", row.exit_scroll_position)?,
            user_agent: row.user_agent,
        })
    }
}

fn into_readings(rows: Vec<ReadingRow>) -> Result<Vec<ReadingAnalytics>, RepoError> {
    rows.into_iter().map(ReadingAnalytics::try_from).collect()
}

#[async_trait]
impl ReadingAnalyticsRepo for PostgresRepositories {
    async fn insert_reading(&self, reading: &ReadingAnalytics) -> Result<(), RepoError> {
        let [reached_25, reached_50, reached_75, reached_100] = reading.milestones.as_flags();
        sqlx::query(
            r#"
            INSERT INTO reading_analytics (
                id, slug, session_id, timestamp, max_scroll_depth,
                reached_25, reached_50, reached_75, reached_100,
                time_on_page, exit_scroll_position, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(reading.id)
        .bind(&reading.slug)
        .bind(reading.session_id.as_str())
        .bind(reading.timestamp)
        .bind(i16::from(reading.max_scroll_depth.get()))
        .bind(reached_25)
        .bind(reached_50)
        .bind(reached_75)
        .bind(reached_100)
        .bind(i64::from(reading.time_on_page))
        .bind(i16::from(reading.exit_scroll_position.get()))
        .bind(reading.user_agent.as_deref())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_readings(&self) -> Result<Vec<ReadingAnalytics>, RepoError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM reading_analytics ORDER BY timestamp DESC"
        );
        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_readings(rows)
    }

    async fn list_readings_by_slug(&self, slug: &str) -> Result<Vec<ReadingAnalytics>, RepoError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM reading_analytics WHERE slug = $1 ORDER BY timestamp DESC"
        );
        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(slug)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_readings(rows)
    }

    async fn delete_all_readings(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM reading_analytics")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

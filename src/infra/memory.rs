//! Process-local event store for development and tests.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::repos::{
    FeedbackRepo, ReadingAnalyticsRepo, RepoError, StoreHealth, ViewsRepo,
};
use crate::domain::entities::{Feedback, ReadingAnalytics, Timestamped, View, sort_newest_first};
use crate::domain::types::SessionId;

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    views: RwLock<Vec<View>>,
    feedback: RwLock<Vec<Feedback>>,
    readings: RwLock<Vec<ReadingAnalytics>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(rows: &[T], keep: F) -> Vec<T>
where
    T: Clone + Timestamped,
    F: Fn(&T) -> bool,
{
    let mut selected: Vec<T> = rows.iter().filter(|row| keep(row)).cloned().collect();
    sort_newest_first(&mut selected);
    selected
}

fn drain_count<T>(rows: &mut Vec<T>) -> u64 {
    let removed = rows.len() as u64;
    rows.clear();
    removed
}

#[async_trait]
impl ViewsRepo for MemoryEventStore {
    async fn insert_view(&self, view: &View) -> Result<(), RepoError> {
        self.views.write().await.push(view.clone());
        Ok(())
    }

    async fn list_views(&self) -> Result<Vec<View>, RepoError> {
        Ok(newest_first(self.views.read().await.as_slice(), |_| true))
    }

    async fn list_views_by_slug(&self, slug: &str) -> Result<Vec<View>, RepoError> {
        Ok(newest_first(self.views.read().await.as_slice(), |view| view.slug == slug))
    }

    async fn view_exists_since(
        &self,
        session: &SessionId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        Ok(self.views.read().await.iter().any(|view| {
            view.session_id == *session && view.slug == slug && view.timestamp > since
        }))
    }

    async fn delete_all_views(&self) -> Result<u64, RepoError> {
        Ok(drain_count(&mut *self.views.write().await))
    }
}

#[async_trait]
impl FeedbackRepo for MemoryEventStore {
    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), RepoError> {
        self.feedback.write().await.push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>, RepoError> {
        Ok(newest_first(self.feedback.read().await.as_slice(), |_| true))
    }

    async fn list_feedback_by_slug(&self, slug: &str) -> Result<Vec<Feedback>, RepoError> {
        Ok(newest_first(self.feedback.read().await.as_slice(), |entry| entry.slug == slug))
    }

    async fn delete_all_feedback(&self) -> Result<u64, RepoError> {
        Ok(drain_count(&mut *self.feedback.write().await))
    }
}

#[async_trait]
impl ReadingAnalyticsRepo for MemoryEventStore {
    async fn insert_reading(&self, reading: &ReadingAnalytics) -> Result<(), RepoError> {
        self.readings.write().await.push(reading.clone());
        Ok(())
    }

    async fn list_readings(&self) -> Result<Vec<ReadingAnalytics>, RepoError> {
        Ok(newest_first(self.readings.read().await.as_slice(), |_| true))
    }

    async fn list_readings_by_slug(&self, slug: &str) -> Result<Vec<ReadingAnalytics>, RepoError> {
        Ok(newest_first(self.readings.read().await.as_slice(), |reading| {
            reading.slug == slug
        }))
    }

    async fn delete_all_readings(&self) -> Result<u64, RepoError> {
        Ok(drain_count(&mut *self.readings.write().await))
    }
}

#[async_trait]
impl StoreHealth for MemoryEventStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn view(slug: &str, session: &SessionId, timestamp: OffsetDateTime) -> View {
        View {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            timestamp,
            session_id: session.clone(),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn exists_since_is_strict_and_scoped() {
        let store = MemoryEventStore::new();
        let session = SessionId::generate();
        let at = datetime!(2024-05-01 12:00 UTC);
        store
            .insert_view(&view("a", &session, at))
            .await
            .expect("insert");

        assert!(store.view_exists_since(&session, "a", at - time::Duration::SECOND).await.expect("query"));
        assert!(!store.view_exists_since(&session, "a", at).await.expect("query"));
        assert!(!store.view_exists_since(&session, "b", at - time::Duration::HOUR).await.expect("query"));
        assert!(!store
            .view_exists_since(&SessionId::generate(), "a", at - time::Duration::HOUR)
            .await
            .expect("query"));
    }

    #[tokio::test]
    async fn delete_all_reports_removed_rows() {
        let store = MemoryEventStore::new();
        let session = SessionId::generate();
        let at = datetime!(2024-05-01 12:00 UTC);
        for slug in ["a", "b"] {
            store
                .insert_view(&view(slug, &session, at))
                .await
                .expect("insert");
        }

        assert_eq!(store.list_views_by_slug("a").await.expect("list").len(), 1);
        assert_eq!(store.delete_all_views().await.expect("delete"), 2);
        assert!(store.list_views().await.expect("list").is_empty());
    }
}

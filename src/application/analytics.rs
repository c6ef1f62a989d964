use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::try_join;

use crate::application::repos::{
    FeedbackRepo, PostsRepo, ReadingAnalyticsRepo, RepoError, ViewsRepo,
};
use crate::domain::analytics::{EventSet, PostReport, SiteReport, post_report, site_report};

pub(crate) const METRIC_ANALYTICS_COMPUTE_MS: &str = "margin_analytics_compute_ms";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("post `{0}` not found")]
    PostNotFound(String),
    #[error("failed to load {what}")]
    Store {
        what: &'static str,
        #[source]
        source: RepoError,
    },
}

/// Fetches posts and events, then hands them to the aggregation engine.
#[derive(Clone)]
pub struct AnalyticsService {
    posts: Arc<dyn PostsRepo>,
    views: Arc<dyn ViewsRepo>,
    feedback: Arc<dyn FeedbackRepo>,
    readings: Arc<dyn ReadingAnalyticsRepo>,
}

impl AnalyticsService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        views: Arc<dyn ViewsRepo>,
        feedback: Arc<dyn FeedbackRepo>,
        readings: Arc<dyn ReadingAnalyticsRepo>,
    ) -> Self {
        Self {
            posts,
            views,
            feedback,
            readings,
        }
    }

    pub async fn site_report(&self) -> Result<SiteReport, AnalyticsError> {
        self.site_report_at(OffsetDateTime::now_utc()).await
    }

    pub async fn site_report_at(&self, now: OffsetDateTime) -> Result<SiteReport, AnalyticsError> {
        let (views, feedback, readings) = try_join!(
            async { self.views.list_views().await.map_err(store("views")) },
            async { self.feedback.list_feedback().await.map_err(store("feedback")) },
            async { self.readings.list_readings().await.map_err(store("reading analytics")) },
        )?;
        let posts = self.posts.list_posts().await.map_err(store("posts"))?;

        let events = EventSet {
            views,
            feedback,
            readings,
        };
        let started_at = Instant::now();
        let report = site_report(&posts, &events, now);
        record_compute_time(started_at, "site");
        Ok(report)
    }

    pub async fn post_report(&self, slug: &str) -> Result<PostReport, AnalyticsError> {
        self.post_report_at(slug, OffsetDateTime::now_utc()).await
    }

    pub async fn post_report_at(
        &self,
        slug: &str,
        now: OffsetDateTime,
    ) -> Result<PostReport, AnalyticsError> {
        let post = self
            .posts
            .find_by_slug(slug)
            .await
            .map_err(store("posts"))?
            .ok_or_else(|| AnalyticsError::PostNotFound(slug.to_string()))?;

        let (views, feedback, readings) = try_join!(
            async { self.views.list_views_by_slug(slug).await.map_err(store("views")) },
            async {
                self.feedback
                    .list_feedback_by_slug(slug)
                    .await
                    .map_err(store("feedback"))
            },
            async {
                self.readings
                    .list_readings_by_slug(slug)
                    .await
                    .map_err(store("reading analytics"))
            },
        )?;

        let events = EventSet {
            views,
            feedback,
            readings,
        };
        let started_at = Instant::now();
        let report = post_report(&post, &events, now);
        record_compute_time(started_at, "post");
        Ok(report)
    }
}

fn store(what: &'static str) -> impl Fn(RepoError) -> AnalyticsError {
    move |source| AnalyticsError::Store { what, source }
}

fn record_compute_time(started_at: Instant, scope: &'static str) {
    histogram!(METRIC_ANALYTICS_COMPUTE_MS, "scope" => scope)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::posts::Post;
    use crate::infra::memory::MemoryEventStore;

    struct FixedPosts(Vec<Post>);

    #[async_trait]
    impl PostsRepo for FixedPosts {
        async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
            Ok(self.0.clone())
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, RepoError> {
            Ok(self.0.iter().find(|post| post.slug == slug).cloned())
        }
    }

    fn service(posts: Vec<Post>) -> AnalyticsService {
        let store = Arc::new(MemoryEventStore::new());
        AnalyticsService::new(
            Arc::new(FixedPosts(posts)),
            store.clone(),
            store.clone(),
            store,
        )
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let service = service(Vec::new());
        let err = service
            .post_report("missing")
            .await
            .expect_err("no such post");
        assert!(matches!(err, AnalyticsError::PostNotFound(slug) if slug == "missing"));
    }

    #[tokio::test]
    async fn empty_store_produces_zeroed_site_report() {
        let post = Post::parse("hello", "# Hello\nbody").expect("valid post");
        let report = service(vec![post])
            .site_report()
            .await
            .expect("report");

        assert_eq!(report.overall_stats.total_posts, 1);
        assert_eq!(report.overall_stats.total_views, 0);
        assert_eq!(report.post_analytics[0].title, "Hello");
    }
}

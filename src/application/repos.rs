//! Repository traits describing persistence adapters.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{Feedback, ReadingAnalytics, View};
use crate::domain::posts::Post;
use crate::domain::types::SessionId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Append-only page view log.
///
/// Listings are ordered newest first.
#[async_trait]
pub trait ViewsRepo: Send + Sync {
    async fn insert_view(&self, view: &View) -> Result<(), RepoError>;

    async fn list_views(&self) -> Result<Vec<View>, RepoError>;

    async fn list_views_by_slug(&self, slug: &str) -> Result<Vec<View>, RepoError>;

    /// Whether `session` already viewed `slug` strictly after `since`.
    async fn view_exists_since(
        &self,
        session: &SessionId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    async fn delete_all_views(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait FeedbackRepo: Send + Sync {
    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), RepoError>;

    async fn list_feedback(&self) -> Result<Vec<Feedback>, RepoError>;

    async fn list_feedback_by_slug(&self, slug: &str) -> Result<Vec<Feedback>, RepoError>;

    async fn delete_all_feedback(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ReadingAnalyticsRepo: Send + Sync {
    async fn insert_reading(&self, reading: &ReadingAnalytics) -> Result<(), RepoError>;

    async fn list_readings(&self) -> Result<Vec<ReadingAnalytics>, RepoError>;

    async fn list_readings_by_slug(&self, slug: &str) -> Result<Vec<ReadingAnalytics>, RepoError>;

    async fn delete_all_readings(&self) -> Result<u64, RepoError>;
}

/// Liveness probe for whichever event store backs the process.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

/// Read-only access to published posts.
#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Every post, newest first.
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, RepoError>;
}

/// Any backend able to hold all three event logs.
pub trait EventStore: ViewsRepo + FeedbackRepo + ReadingAnalyticsRepo + StoreHealth {}

impl<T> EventStore for T where T: ViewsRepo + FeedbackRepo + ReadingAnalyticsRepo + StoreHealth {}

/// The event logs as independently held trait objects.
#[derive(Clone)]
pub struct EventStores {
    pub views: Arc<dyn ViewsRepo>,
    pub feedback: Arc<dyn FeedbackRepo>,
    pub readings: Arc<dyn ReadingAnalyticsRepo>,
    pub health: Arc<dyn StoreHealth>,
}

impl EventStores {
    pub fn from_backend<T: EventStore + 'static>(backend: Arc<T>) -> Self {
        Self {
            views: backend.clone(),
            feedback: backend.clone(),
            readings: backend.clone(),
            health: backend,
        }
    }
}

//! Telemetry entities mirrored from persistent storage.
//!
//! All three event kinds are append-only: once stored they are never
//! updated, only read back for aggregation.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{Milestones, Rating, ScrollPercent, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: Uuid,
    pub slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub session_id: SessionId,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub slug: String,
    pub rating: Rating,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingAnalytics {
    pub id: Uuid,
    pub slug: String,
    pub session_id: SessionId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub max_scroll_depth: ScrollPercent,
    #[serde(flatten)]
    pub milestones: Milestones,
    /// Seconds between page load and the visit ending.
    pub time_on_page: u32,
    pub exit_scroll_position: ScrollPercent,
    pub user_agent: Option<String>,
}

impl ReadingAnalytics {
    pub fn completed(&self) -> bool {
        self.milestones.reached100
    }
}

/// Anything stamped with the moment it was recorded.
pub trait Timestamped {
    fn timestamp(&self) -> OffsetDateTime;
}

impl Timestamped for View {
    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

impl Timestamped for Feedback {
    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

impl Timestamped for ReadingAnalytics {
    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// Sorts newest first, the order every listing returns.
pub fn sort_newest_first<T: Timestamped>(items: &mut [T]) {
    items.sort_by_key(|item| std::cmp::Reverse(item.timestamp()));
}

//! Telemetry ingestion: validation, view deduplication and persistence.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{FeedbackRepo, ReadingAnalyticsRepo, RepoError, ViewsRepo};
use crate::domain::entities::{Feedback, ReadingAnalytics, View, sort_newest_first};
use crate::domain::error::DomainError;
use crate::domain::types::{Milestones, Rating, ScrollPercent, SessionId};

pub const DEFAULT_VIEW_DEDUP_WINDOW: Duration = Duration::minutes(30);
/// Stored when a request carries no `User-Agent`.
pub const UNKNOWN_USER_AGENT: &str = "Unknown";

pub(crate) const METRIC_VIEWS_RECORDED: &str = "margin_views_recorded_total";
pub(crate) const METRIC_VIEWS_DEDUPLICATED: &str = "margin_views_deduplicated_total";
pub(crate) const METRIC_FEEDBACK_RECORDED: &str = "margin_feedback_recorded_total";
pub(crate) const METRIC_READING_RECORDED: &str = "margin_reading_recorded_total";

const SOURCE: &str = "application::ingest::IngestService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    View,
    Feedback,
    Reading,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::View => "view",
            Self::Feedback => "feedback",
            Self::Reading => "reading analytics",
        })
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid {kind}: {message}")]
    Invalid { kind: EventKind, message: String },
    #[error("failed to save {kind}")]
    Save {
        kind: EventKind,
        #[source]
        source: RepoError,
    },
    #[error("failed to read {kind}")]
    Read {
        kind: EventKind,
        #[source]
        source: RepoError,
    },
}

impl IngestError {
    pub fn invalid(kind: EventKind, message: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Invalid { kind, .. } | Self::Save { kind, .. } | Self::Read { kind, .. } => *kind,
        }
    }

    fn from_domain(kind: EventKind, err: DomainError) -> Self {
        Self::invalid(kind, err.to_string())
    }
}

/// Raw fields of a rating submission, before validation.
#[derive(Debug, Clone, Default)]
pub struct FeedbackSubmission {
    pub slug: Option<String>,
    pub rating: Option<f64>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewSubmission {
    pub slug: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingSubmission {
    pub slug: Option<String>,
    pub session_id: Option<String>,
    pub max_scroll_depth: Option<f64>,
    pub time_on_page: Option<f64>,
    pub exit_scroll_position: Option<f64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    Counted(View),
    /// The session already viewed this post inside the dedup window.
    Duplicate { session_id: SessionId },
}

#[derive(Clone)]
pub struct IngestService {
    views: Arc<dyn ViewsRepo>,
    feedback: Arc<dyn FeedbackRepo>,
    readings: Arc<dyn ReadingAnalyticsRepo>,
    dedup_window: Duration,
}

impl IngestService {
    pub fn new(
        views: Arc<dyn ViewsRepo>,
        feedback: Arc<dyn FeedbackRepo>,
        readings: Arc<dyn ReadingAnalyticsRepo>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            views,
            feedback,
            readings,
            dedup_window,
        }
    }

    pub async fn record_feedback(
        &self,
        submission: FeedbackSubmission,
    ) -> Result<Feedback, IngestError> {
        self.record_feedback_at(submission, OffsetDateTime::now_utc())
            .await
    }

    pub async fn record_feedback_at(
        &self,
        submission: FeedbackSubmission,
        now: OffsetDateTime,
    ) -> Result<Feedback, IngestError> {
        let kind = EventKind::Feedback;
        let slug = require_slug(kind, submission.slug)?;
        let rating = submission
            .rating
            .ok_or_else(|| IngestError::invalid(kind, "rating is required"))
            .and_then(|value| parse_rating(kind, value))?;
        let session_id = resolve_session(kind, submission.session_id.as_deref())?;

        let feedback = Feedback {
            id: Uuid::new_v4(),
            slug,
            rating,
            timestamp: now,
            session_id,
        };
        self.feedback
            .insert_feedback(&feedback)
            .await
            .map_err(|source| IngestError::Save { kind, source })?;

        counter!(METRIC_FEEDBACK_RECORDED).increment(1);
        debug!(
            target = SOURCE,
            slug = %feedback.slug,
            rating = feedback.rating.get(),
            "feedback recorded"
        );
        Ok(feedback)
    }

    pub async fn record_view(&self, submission: ViewSubmission) -> Result<ViewOutcome, IngestError> {
        self.record_view_at(submission, OffsetDateTime::now_utc())
            .await
    }

    pub async fn record_view_at(
        &self,
        submission: ViewSubmission,
        now: OffsetDateTime,
    ) -> Result<ViewOutcome, IngestError> {
        let kind = EventKind::View;
        let slug = require_slug(kind, submission.slug)?;
        let session_id = resolve_session(kind, submission.session_id.as_deref())?;

        // Advisory: two concurrent first views may both be admitted.
        let duplicate = self
            .views
            .view_exists_since(&session_id, &slug, now - self.dedup_window)
            .await
            .map_err(|source| IngestError::Save { kind, source })?;
        if duplicate {
            counter!(METRIC_VIEWS_DEDUPLICATED).increment(1);
            debug!(target = SOURCE, slug = %slug, "duplicate view ignored");
            return Ok(ViewOutcome::Duplicate { session_id });
        }

        let view = View {
            id: Uuid::new_v4(),
            slug,
            timestamp: now,
            session_id,
            user_agent: Some(user_agent_or_unknown(submission.user_agent)),
        };
        self.views
            .insert_view(&view)
            .await
            .map_err(|source| IngestError::Save { kind, source })?;

        counter!(METRIC_VIEWS_RECORDED).increment(1);
        Ok(ViewOutcome::Counted(view))
    }

    pub async fn record_reading(
        &self,
        submission: ReadingSubmission,
    ) -> Result<ReadingAnalytics, IngestError> {
        self.record_reading_at(submission, OffsetDateTime::now_utc())
            .await
    }

    pub async fn record_reading_at(
        &self,
        submission: ReadingSubmission,
        now: OffsetDateTime,
    ) -> Result<ReadingAnalytics, IngestError> {
        let kind = EventKind::Reading;
        let slug = require_slug(kind, submission.slug)?;
        let max_scroll_depth = submission
            .max_scroll_depth
            .ok_or_else(|| IngestError::invalid(kind, "maxScrollDepth is required"))
            .and_then(|value| parse_percent(kind, "maxScrollDepth", value))?;
        let time_on_page = submission
            .time_on_page
            .ok_or_else(|| IngestError::invalid(kind, "timeOnPage is required"))
            .and_then(|value| parse_seconds(kind, value))?;
        let exit_scroll_position = match submission.exit_scroll_position {
            Some(value) => parse_percent(kind, "exitScrollPosition", value)?,
            None => max_scroll_depth,
        };
        let session_id = resolve_session(kind, submission.session_id.as_deref())?;

        let reading = ReadingAnalytics {
            id: Uuid::new_v4(),
            slug,
            session_id,
            timestamp: now,
            max_scroll_depth,
            milestones: Milestones::from_depth(max_scroll_depth),
            time_on_page,
            exit_scroll_position,
            user_agent: Some(user_agent_or_unknown(submission.user_agent)),
        };
        self.readings
            .insert_reading(&reading)
            .await
            .map_err(|source| IngestError::Save { kind, source })?;

        counter!(METRIC_READING_RECORDED).increment(1);
        Ok(reading)
    }

    pub async fn list_views(&self) -> Result<Vec<View>, IngestError> {
        let mut views = self
            .views
            .list_views()
            .await
            .map_err(|source| IngestError::Read {
                kind: EventKind::View,
                source,
            })?;
        sort_newest_first(&mut views);
        Ok(views)
    }

    pub async fn list_feedback(&self) -> Result<Vec<Feedback>, IngestError> {
        let mut feedback = self
            .feedback
            .list_feedback()
            .await
            .map_err(|source| IngestError::Read {
                kind: EventKind::Feedback,
                source,
            })?;
        sort_newest_first(&mut feedback);
        Ok(feedback)
    }

    pub async fn list_readings(&self) -> Result<Vec<ReadingAnalytics>, IngestError> {
        let mut readings = self
            .readings
            .list_readings()
            .await
            .map_err(|source| IngestError::Read {
                kind: EventKind::Reading,
                source,
            })?;
        sort_newest_first(&mut readings);
        Ok(readings)
    }
}

fn require_slug(kind: EventKind, slug: Option<String>) -> Result<String, IngestError> {
    slug.map(|slug| slug.trim().to_string())
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| IngestError::invalid(kind, "slug is required"))
}

fn resolve_session(kind: EventKind, raw: Option<&str>) -> Result<SessionId, IngestError> {
    let parsed = raw
        .map(SessionId::parse)
        .transpose()
        .map_err(|err| IngestError::from_domain(kind, err))?
        .flatten();
    Ok(parsed.unwrap_or_else(SessionId::generate))
}

fn parse_rating(kind: EventKind, value: f64) -> Result<Rating, IngestError> {
    if value.fract() != 0.0 {
        return Err(IngestError::invalid(
            kind,
            format!("rating must be a whole number, got {value}"),
        ));
    }
    // Out-of-range values saturate and are then rejected by `Rating`.
    Rating::try_from(value as i64).map_err(|err| IngestError::from_domain(kind, err))
}

fn parse_percent(kind: EventKind, field: &str, value: f64) -> Result<ScrollPercent, IngestError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(IngestError::invalid(
            kind,
            format!("{field} must be between 0 and 100, got {value}"),
        ));
    }
    ScrollPercent::new(value.round() as u8).map_err(|err| IngestError::from_domain(kind, err))
}

fn parse_seconds(kind: EventKind, value: f64) -> Result<u32, IngestError> {
    if !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(IngestError::invalid(
            kind,
            format!("timeOnPage must be a non-negative number of seconds, got {value}"),
        ));
    }
    Ok(value.round() as u32)
}

fn user_agent_or_unknown(user_agent: Option<String>) -> String {
    user_agent
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_USER_AGENT.to_string())
}

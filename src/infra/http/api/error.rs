use std::error::Error as StdError;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::analytics::AnalyticsError;
use crate::application::error::ErrorReport;
use crate::application::ingest::{EventKind, IngestError};
use crate::application::posts::PostError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

pub mod messages {
    pub const DASHBOARD_PASSWORD_REQUIRED: &str = "Dashboard password required";
    pub const RATE_LIMITED: &str = "Rate limit exceeded";
    pub const POST_NOT_FOUND: &str = "Post not found";
    pub const ANALYTICS_FAILED: &str = "Failed to generate analytics";
    pub const POSTS_FAILED: &str = "Failed to load posts";
}

/// JSON error returned by the public API. The public message stays generic;
/// the full diagnostic travels in the attached [`ErrorReport`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            "infra::http::api::dashboard_auth",
            StatusCode::UNAUTHORIZED,
            messages::DASHBOARD_PASSWORD_REQUIRED,
            detail,
        )
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let mut response = Self::new(
            "infra::http::api::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            messages::RATE_LIMITED,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message.to_string(),
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

fn invalid_message(kind: EventKind) -> &'static str {
    match kind {
        EventKind::View => "Invalid view data",
        EventKind::Feedback => "Invalid feedback data",
        EventKind::Reading => "Invalid analytics data",
    }
}

fn save_message(kind: EventKind) -> &'static str {
    match kind {
        EventKind::View => "Failed to save view",
        EventKind::Feedback => "Failed to save feedback",
        EventKind::Reading => "Failed to save analytics",
    }
}

fn read_message(kind: EventKind) -> &'static str {
    match kind {
        EventKind::View => "Failed to read views",
        EventKind::Feedback => "Failed to read feedback",
        EventKind::Reading => "Failed to read analytics",
    }
}

impl ApiError {
    /// A body that failed to deserialize gets the same answer as one that
    /// failed validation.
    pub fn invalid_payload(kind: EventKind, detail: impl Into<String>) -> Self {
        Self::new(
            "infra::http::api::events",
            StatusCode::BAD_REQUEST,
            invalid_message(kind),
            detail,
        )
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        const SOURCE: &str = "application::ingest::IngestService";
        let kind = err.kind();
        match &err {
            IngestError::Invalid { .. } => Self::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                invalid_message(kind),
                &err,
            ),
            IngestError::Save { .. } => Self::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                save_message(kind),
                &err,
            ),
            IngestError::Read { .. } => Self::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                read_message(kind),
                &err,
            ),
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        const SOURCE: &str = "application::analytics::AnalyticsService";
        match &err {
            AnalyticsError::PostNotFound(_) => Self::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                messages::POST_NOT_FOUND,
                &err,
            ),
            AnalyticsError::Store { .. } => Self::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                messages::ANALYTICS_FAILED,
                &err,
            ),
        }
    }
}

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        const SOURCE: &str = "application::posts::PostService";
        match &err {
            PostError::NotFound(_) => Self::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                messages::POST_NOT_FOUND,
                &err,
            ),
            PostError::Repo(_) => Self::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                messages::POSTS_FAILED,
                &err,
            ),
        }
    }
}

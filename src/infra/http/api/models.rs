use serde::{Deserialize, Serialize};

use crate::application::ingest::{FeedbackSubmission, ReadingSubmission, ViewSubmission};
use crate::domain::entities::{Feedback, View};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub slug: Option<String>,
    pub rating: Option<f64>,
    pub session_id: Option<String>,
}

impl From<FeedbackRequest> for FeedbackSubmission {
    fn from(request: FeedbackRequest) -> Self {
        Self {
            slug: request.slug,
            rating: request.rating,
            session_id: request.session_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRequest {
    pub slug: Option<String>,
    pub session_id: Option<String>,
}

impl ViewRequest {
    pub fn into_submission(self, user_agent: Option<String>) -> ViewSubmission {
        ViewSubmission {
            slug: self.slug,
            session_id: self.session_id,
            user_agent,
        }
    }
}

/// Milestone flags a browser may also send are ignored; the server derives
/// them from `maxScrollDepth`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRequest {
    pub slug: Option<String>,
    pub session_id: Option<String>,
    pub max_scroll_depth: Option<f64>,
    pub time_on_page: Option<f64>,
    pub exit_scroll_position: Option<f64>,
}

impl ReadingRequest {
    pub fn into_submission(self, user_agent: Option<String>) -> ReadingSubmission {
        ReadingSubmission {
            slug: self.slug,
            session_id: self.session_id,
            max_scroll_depth: self.max_scroll_depth,
            time_on_page: self.time_on_page,
            exit_scroll_position: self.exit_scroll_position,
            user_agent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackCreated {
    pub success: bool,
    pub feedback: Feedback,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecorded {
    pub success: bool,
    pub counted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRecorded {
    pub success: bool,
    pub session_id: String,
}

use std::sync::Arc;

use crate::application::analytics::AnalyticsService;
use crate::application::dashboard::DashboardGate;
use crate::application::ingest::IngestService;
use crate::application::posts::PostService;

use super::rate_limit::IngestRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub analytics: Arc<AnalyticsService>,
    pub ingest: Arc<IngestService>,
    pub posts: Arc<PostService>,
    pub dashboard: Arc<DashboardGate>,
    pub rate_limiter: Arc<IngestRateLimiter>,
}

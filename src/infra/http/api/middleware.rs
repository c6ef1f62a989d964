use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::error::ApiError;
use super::rate_limit::RateDecision;
use super::state::ApiState;

pub const SESSION_HEADER: &str = "x-session-id";
pub const DASHBOARD_PASSWORD_HEADER: &str = "x-dashboard-password";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const ANONYMOUS_CLIENT: &str = "anonymous";

pub async fn dashboard_auth(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = extract_password(request.headers());
    if let Err(err) = state.dashboard.authorize(presented.as_deref()) {
        return ApiError::unauthorized(err.to_string()).into_response();
    }

    next.run(request).await
}

pub async fn ingest_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let client = client_key(request.headers());

    match state.rate_limiter.check(&client, &path) {
        RateDecision::Limited { retry_after } => {
            debug!(
                target = "margin::api::ratelimit",
                client = %client,
                path = %path,
                "ingestion rate limit hit"
            );
            ApiError::rate_limited(retry_after.as_secs().max(1))
        }
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(state.rate_limiter.limit()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
    }
}

fn extract_password(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "));
    let custom = || {
        headers
            .get(DASHBOARD_PASSWORD_HEADER)
            .and_then(|value| value.to_str().ok())
    };
    bearer.or_else(custom).map(|value| value.trim().to_string())
}

/// Identifies the caller from headers alone: session id, then the first
/// forwarded address, then a shared anonymous bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header(SESSION_HEADER)
        .or_else(|| {
            header(FORWARDED_FOR_HEADER)
                .and_then(|raw| raw.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

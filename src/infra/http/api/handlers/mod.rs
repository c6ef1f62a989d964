//! API handlers organized by resource type.
//!
//! Helpers shared across modules are defined here.

mod analytics;
mod events;
mod posts;

pub use analytics::*;
pub use events::*;
pub use posts::*;

use axum::http::{HeaderMap, header::USER_AGENT};

use super::middleware::SESSION_HEADER;

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    header_string(headers, USER_AGENT.as_str())
}

/// Session id from the body when present, else from the `x-session-id` header.
pub(crate) fn session_or_header(body: Option<String>, headers: &HeaderMap) -> Option<String> {
    body.filter(|value| !value.trim().is_empty())
        .or_else(|| header_string(headers, SESSION_HEADER))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

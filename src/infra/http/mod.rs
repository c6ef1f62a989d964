pub mod api;
mod middleware;

pub use api::rate_limit::IngestRateLimiter;
pub use api::{ApiState, build_api_router};
pub use middleware::{RequestContext, log_responses, set_request_context};

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::error::ErrorReport;
use crate::application::repos::{RepoError, StoreHealth};

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn StoreHealth>,
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub api: ApiState,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

/// The complete application: health probe plus the JSON API, wrapped in
/// request-id and response-logging middleware.
pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/_health", get(store_health))
        .merge(build_api_router(state.clone()))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn store_health(State(state): State<HttpState>) -> Response {
    store_health_response(state.store.ping().await)
}

fn store_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::store_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::RouterState;

/// Dashboard reads sit behind the password gate; event writes pass through
/// the ingestion rate limit. Both share paths and differ by method.
pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    let dashboard = Router::new()
        .route("/analytics", get(handlers::site_analytics))
        .route("/analytics/{slug}", get(handlers::post_analytics))
        .route("/feedback", get(handlers::list_feedback))
        .route("/views", get(handlers::list_views))
        .route("/reading-analytics", get(handlers::list_readings))
        .route_layer(axum_middleware::from_fn_with_state(
            state.api.clone(),
            middleware::dashboard_auth,
        ));

    let ingest = Router::new()
        .route("/feedback", post(handlers::record_feedback))
        .route("/views", post(handlers::record_view))
        .route("/reading-analytics", post(handlers::record_reading))
        .route_layer(axum_middleware::from_fn_with_state(
            state.api.clone(),
            middleware::ingest_rate_limit,
        ));

    let content = Router::new()
        .route("/posts", get(handlers::list_posts))
        .route("/posts/{slug}", get(handlers::get_post));

    dashboard.merge(ingest).merge(content)
}

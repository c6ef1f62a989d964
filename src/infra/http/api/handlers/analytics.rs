//! Dashboard analytics handlers

use axum::Json;
use axum::extract::{Path, State};

use crate::domain::analytics::{PostReport, SiteReport};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn site_analytics(State(state): State<ApiState>) -> Result<Json<SiteReport>, ApiError> {
    Ok(Json(state.analytics.site_report().await?))
}

pub async fn post_analytics(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Json<PostReport>, ApiError> {
    Ok(Json(state.analytics.post_report(&slug).await?))
}

//! Content handlers

use axum::Json;
use axum::extract::{Path, State};

use crate::domain::posts::{Post, PostSummary};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn list_posts(State(state): State<ApiState>) -> Result<Json<Vec<PostSummary>>, ApiError> {
    Ok(Json(state.posts.list().await?))
}

pub async fn get_post(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.posts.get(&slug).await?))
}

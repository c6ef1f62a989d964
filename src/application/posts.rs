use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::posts::{Post, PostSummary};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostsRepo>) -> Self {
        Self { posts }
    }

    /// Metadata for every post, newest first, without bodies.
    pub async fn list(&self) -> Result<Vec<PostSummary>, PostError> {
        let posts = self.posts.list_posts().await?;
        Ok(posts.iter().map(PostSummary::from).collect())
    }

    pub async fn get(&self, slug: &str) -> Result<Post, PostError> {
        self.posts
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| PostError::NotFound(slug.to_string()))
    }
}

//! Markdown post directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::error::DomainError;
use crate::domain::posts::{Post, sort_posts_by_date};

const MARKDOWN_EXTENSION: &str = "md";
/// Directory documentation, never published as a post.
const README_FILE: &str = "README.md";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{path}` is not valid UTF-8")]
    Encoding { path: PathBuf },
    #[error("failed to parse post `{slug}`")]
    Parse {
        slug: String,
        #[source]
        source: DomainError,
    },
}

impl From<ContentError> for RepoError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Parse { slug, source } => RepoError::InvalidInput {
                message: format!("post `{slug}`: {source}"),
            },
            other => RepoError::from_persistence(other),
        }
    }
}

/// Posts stored as `{slug}.md` files in a single directory.
#[derive(Debug, Clone)]
pub struct MarkdownDirectory {
    root: PathBuf,
}

impl MarkdownDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every post in file-name order, before date ordering.
    pub async fn load_all(&self) -> Result<Vec<Post>, ContentError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    target = "margin::infra::content",
                    root = %self.root.display(),
                    "posts directory missing; serving no posts"
                );
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ContentError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| ContentError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if is_file && is_post_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        let mut posts = Vec::with_capacity(files.len());
        for path in files {
            let Some(slug) = path.file_stem().and_then(|stem| stem.to_str()) else {
                return Err(ContentError::Encoding { path: path.clone() });
            };
            let slug = slug.to_string();
            posts.push(self.read_post(&slug, &path).await?);
        }
        Ok(posts)
    }

    /// Reads `{root}/{slug}.md`. Slugs that are not plain file stems, or
    /// that have no file, resolve to `None`.
    pub async fn load(&self, slug: &str) -> Result<Option<Post>, ContentError> {
        if !is_plain_slug(slug) {
            return Ok(None);
        }
        let path = self.root.join(format!("{slug}.{MARKDOWN_EXTENSION}"));
        match self.read_post(slug, &path).await {
            Ok(post) => Ok(Some(post)),
            Err(ContentError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn read_post(&self, slug: &str, path: &Path) -> Result<Post, ContentError> {
        let bytes = fs::read(path).await.map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = String::from_utf8(bytes).map_err(|_| ContentError::Encoding {
            path: path.to_path_buf(),
        })?;
        Post::parse(slug, &source).map_err(|source| ContentError::Parse {
            slug: slug.to_string(),
            source,
        })
    }
}

fn is_post_file(path: &Path) -> bool {
    let is_markdown = path
        .extension()
        .is_some_and(|ext| ext == MARKDOWN_EXTENSION);
    let is_readme = path
        .file_name()
        .is_some_and(|name| name == README_FILE);
    is_markdown && !is_readme
}

fn is_plain_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('.')
        && !slug.contains(['/', '\\', '\0'])
        && slug != README_FILE.trim_end_matches(".md")
}

#[async_trait]
impl PostsRepo for MarkdownDirectory {
    async fn list_posts(&self) -> Result<Vec<Post>, RepoError> {
        let mut posts = self.load_all().await?;
        sort_posts_by_date(&mut posts);
        Ok(posts)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, RepoError> {
        Ok(self.load(slug).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_must_be_plain_stems() {
        assert!(is_plain_slug("hello-world"));
        assert!(!is_plain_slug(""));
        assert!(!is_plain_slug(".hidden"));
        assert!(!is_plain_slug("../etc/passwd"));
        assert!(!is_plain_slug("nested/post"));
        assert!(!is_plain_slug("README"));
        assert!(!is_plain_slug("a\0b"));
    }
}

//! Markdown posts: frontmatter parsing, title fallback, reading time and
//! feed ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, format_description::FormatItem, format_description::well_known::Rfc3339,
    macros::format_description,
};

use super::error::DomainError;

pub const WORDS_PER_MINUTE: usize = 200;

const FRONTMATTER_DELIMITER: &str = "---";
const ISO_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossPost {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadingTime {
    pub words: usize,
    pub minutes: u32,
}

impl ReadingTime {
    pub fn estimate(body: &str) -> Self {
        let words = body.split_whitespace().count();
        let minutes = words.div_ceil(WORDS_PER_MINUTE) as u32;
        Self { words, minutes }
    }

    pub fn text(&self) -> String {
        format!("{} min read", self.minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub date: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cross_posts: Option<Vec<CrossPost>>,
    pub content: String,
    #[serde(serialize_with = "serialize_reading_time")]
    pub reading_time: ReadingTime,
}

/// Post metadata without the markdown body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub slug: String,
    pub title: String,
    pub date: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cross_posts: Option<Vec<CrossPost>>,
    pub reading_time: String,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        Self {
            slug: post.slug.clone(),
            title: post.title.clone(),
            date: post.date.clone(),
            category: post.category.clone(),
            description: post.description.clone(),
            tags: post.tags.clone(),
            cross_posts: post.cross_posts.clone(),
            reading_time: post.reading_time.text(),
        }
    }
}

fn serialize_reading_time<S>(value: &ReadingTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&value.text())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Frontmatter {
    title: Option<String>,
    date: Option<serde_yaml::Value>,
    category: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    cross_posts: Option<Vec<CrossPost>>,
}

impl Post {
    /// Parses a markdown document with optional YAML frontmatter.
    pub fn parse(slug: &str, source: &str) -> Result<Self, DomainError> {
        let (frontmatter, body) = split_frontmatter(source)?;
        let meta: Frontmatter = match frontmatter {
            Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str(raw).map_err(|err| {
                DomainError::validation(format!("invalid frontmatter in `{slug}`: {err}"))
            })?,
            _ => Frontmatter::default(),
        };

        let title = meta
            .title
            .filter(|title| !title.trim().is_empty())
            .or_else(|| first_heading(body))
            .unwrap_or_else(|| slug.to_string());

        Ok(Self {
            slug: slug.to_string(),
            title,
            date: meta.date.as_ref().and_then(scalar_to_string),
            category: meta.category,
            description: meta.description,
            tags: meta.tags,
            cross_posts: meta.cross_posts,
            reading_time: ReadingTime::estimate(body),
            content: body.to_string(),
        })
    }

    /// Publication date, when the frontmatter carries a recognizable one.
    pub fn published_on(&self) -> Option<Date> {
        self.date.as_deref().and_then(parse_post_date)
    }
}

fn split_frontmatter(source: &str) -> Result<(Option<&str>, &str), DomainError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let Some(first_line_end) = source.find('\n') else {
        return Ok((None, source));
    };
    if source[..first_line_end].trim_end() != FRONTMATTER_DELIMITER {
        return Ok((None, source));
    }

    let rest = &source[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONTMATTER_DELIMITER {
            let frontmatter = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(frontmatter), body));
        }
        offset += line.len();
    }

    Err(DomainError::validation(
        "frontmatter is missing its closing delimiter",
    ))
}

fn first_heading(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let rest = line.strip_prefix('#')?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let heading = rest.trim();
        (!heading.is_empty()).then(|| heading.to_string())
    })
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_post_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    Date::parse(raw, ISO_DATE_FORMAT)
        .ok()
        .or_else(|| OffsetDateTime::parse(raw, &Rfc3339).ok().map(|dt| dt.date()))
}

/// Orders posts newest first.
///
/// Dated posts are sorted among the positions dated posts occupy; undated
/// posts stay exactly where they were.
pub fn sort_posts_by_date(posts: &mut Vec<Post>) {
    let dated_slots: Vec<usize> = posts
        .iter()
        .enumerate()
        .filter(|(_, post)| post.published_on().is_some())
        .map(|(index, _)| index)
        .collect();

    let mut dated: Vec<Post> = dated_slots.iter().map(|&i| posts[i].clone()).collect();
    dated.sort_by(|a, b| compare_dates_desc(a.published_on(), b.published_on()));

    for (slot, post) in dated_slots.into_iter().zip(dated) {
        posts[slot] = post;
    }
}

fn compare_dates_desc(a: Option<Date>, b: Option<Date>) -> Ordering {
    b.cmp(&a)
}

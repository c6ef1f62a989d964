//! Aggregation engine.
//!
//! Pure functions over rows already fetched from the event store. The
//! site-wide and per-post reports are both built from [`ScopedEvents`], so
//! every metric is computed by exactly one routine regardless of scope.

mod distributions;
mod trends;

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

pub use distributions::{
    DROP_OFF_BUCKET_COUNT, DROP_OFF_BUCKET_WIDTH, DropOffBucket, RatingDistribution,
    ScrollDepthDistribution, TIME_BUCKET_BOUNDS, TimeDistribution, drop_off_curve,
};
pub use trends::{
    RatingTrendPoint, ReadingTrendPoint, TREND_WINDOW, rating_trend, reading_trend, utc_date_key,
};

use super::entities::{Feedback, ReadingAnalytics, View};
use super::posts::Post;

/// Which slice of the event log a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsScope<'a> {
    Site,
    Post(&'a str),
}

impl AnalyticsScope<'_> {
    fn includes(&self, slug: &str) -> bool {
        match self {
            Self::Site => true,
            Self::Post(target) => *target == slug,
        }
    }
}

/// Every event row relevant to a report.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    pub views: Vec<View>,
    pub feedback: Vec<Feedback>,
    pub readings: Vec<ReadingAnalytics>,
}

/// Borrowed view of an [`EventSet`] restricted to one scope.
#[derive(Debug, Clone, Default)]
pub struct ScopedEvents<'a> {
    views: Vec<&'a View>,
    feedback: Vec<&'a Feedback>,
    readings: Vec<&'a ReadingAnalytics>,
}

impl EventSet {
    pub fn scoped(&self, scope: AnalyticsScope<'_>) -> ScopedEvents<'_> {
        ScopedEvents {
            views: self.views.iter().filter(|v| scope.includes(&v.slug)).collect(),
            feedback: self
                .feedback
                .iter()
                .filter(|f| scope.includes(&f.slug))
                .collect(),
            readings: self
                .readings
                .iter()
                .filter(|r| scope.includes(&r.slug))
                .collect(),
        }
    }

    /// Splits every row by slug in a single pass.
    pub fn by_slug(&self) -> HashMap<&str, ScopedEvents<'_>> {
        let mut groups: HashMap<&str, ScopedEvents<'_>> = HashMap::new();
        for view in &self.views {
            groups.entry(view.slug.as_str()).or_default().views.push(view);
        }
        for feedback in &self.feedback {
            groups
                .entry(feedback.slug.as_str())
                .or_default()
                .feedback
                .push(feedback);
        }
        for reading in &self.readings {
            groups
                .entry(reading.slug.as_str())
                .or_default()
                .readings
                .push(reading);
        }
        groups
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub total_views: u64,
    pub total_ratings: u64,
    pub average_rating: f64,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSummary {
    pub total_readings: u64,
    pub completion_rate: f64,
    pub avg_scroll_depth: u64,
    pub avg_time: u64,
}

impl ScopedEvents<'_> {
    pub fn engagement(&self) -> EngagementSummary {
        let views = self.views.len();
        let ratings = self.feedback.len();
        let rating_sum: u64 = self
            .feedback
            .iter()
            .map(|f| u64::from(f.rating.get()))
            .sum();

        EngagementSummary {
            total_views: views as u64,
            total_ratings: ratings as u64,
            average_rating: round1(mean(rating_sum as f64, ratings)),
            engagement_rate: round1(percentage(ratings, views)),
        }
    }

    pub fn reading(&self) -> ReadingSummary {
        let total = self.readings.len();
        let completed = self.readings.iter().filter(|r| r.completed()).count();
        let depth_sum: u64 = self
            .readings
            .iter()
            .map(|r| u64::from(r.max_scroll_depth.get()))
            .sum();
        let time_sum: u64 = self
            .readings
            .iter()
            .map(|r| u64::from(r.time_on_page))
            .sum();

        ReadingSummary {
            total_readings: total as u64,
            completion_rate: round1(percentage(completed, total)),
            avg_scroll_depth: mean(depth_sum as f64, total).round() as u64,
            avg_time: mean(time_sum as f64, total).round() as u64,
        }
    }

    pub fn rating_distribution(&self) -> RatingDistribution {
        RatingDistribution::from_feedback(self.feedback.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_views: u64,
    pub total_feedback: u64,
    pub total_posts: u64,
    pub average_rating: f64,
    pub posts_with_feedback: u64,
    pub overall_engagement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytics {
    pub slug: String,
    pub title: String,
    pub total_views: u64,
    pub total_ratings: u64,
    pub average_rating: f64,
    pub engagement_rate: f64,
    pub rating_distribution: RatingDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub completion_rate: f64,
    pub avg_scroll_depth: u64,
    pub avg_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteReport {
    pub overall_stats: OverallStats,
    pub post_analytics: Vec<PostAnalytics>,
    pub trends: Vec<RatingTrendPoint>,
    pub overall_distribution: RatingDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostHeader {
    pub slug: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOverview {
    pub total_views: u64,
    pub total_readings: u64,
    pub total_ratings: u64,
    pub completion_rate: f64,
    pub avg_scroll_depth: u64,
    pub avg_time: u64,
    pub average_rating: f64,
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    pub post: PostHeader,
    pub overview: PostOverview,
    pub scroll_depth_distribution: ScrollDepthDistribution,
    pub time_distribution: TimeDistribution,
    pub drop_off_curve: Vec<DropOffBucket>,
    pub rating_distribution: RatingDistribution,
    pub trends: Vec<ReadingTrendPoint>,
}

/// Dashboard summary across every post.
///
/// Views and feedback whose slug matches no post still count toward the
/// overall totals.
pub fn site_report(posts: &[Post], events: &EventSet, now: OffsetDateTime) -> SiteReport {
    let groups = events.by_slug();
    let unseen = ScopedEvents::default();
    let mut post_analytics: Vec<PostAnalytics> = posts
        .iter()
        .map(|post| {
            let scoped = groups.get(post.slug.as_str()).unwrap_or(&unseen);
            let engagement = scoped.engagement();
            let reading = scoped.reading();
            PostAnalytics {
                slug: post.slug.clone(),
                title: post.title.clone(),
                total_views: engagement.total_views,
                total_ratings: engagement.total_ratings,
                average_rating: engagement.average_rating,
                engagement_rate: engagement.engagement_rate,
                rating_distribution: scoped.rating_distribution(),
                category: post.category.clone(),
                completion_rate: reading.completion_rate,
                avg_scroll_depth: reading.avg_scroll_depth,
                avg_time: reading.avg_time,
            }
        })
        .collect();
    // stable: ties keep content order
    post_analytics.sort_by(|a, b| b.total_ratings.cmp(&a.total_ratings));

    let site = events.scoped(AnalyticsScope::Site);
    let engagement = site.engagement();
    let posts_with_feedback = post_analytics
        .iter()
        .filter(|p| p.total_ratings > 0)
        .count() as u64;

    SiteReport {
        overall_stats: OverallStats {
            total_views: engagement.total_views,
            total_feedback: engagement.total_ratings,
            total_posts: posts.len() as u64,
            average_rating: engagement.average_rating,
            posts_with_feedback,
            overall_engagement_rate: engagement.engagement_rate,
        },
        post_analytics,
        trends: rating_trend(site.feedback.iter().copied(), now),
        overall_distribution: site.rating_distribution(),
    }
}

/// Detailed report for one post.
pub fn post_report(post: &Post, events: &EventSet, now: OffsetDateTime) -> PostReport {
    let scoped = events.scoped(AnalyticsScope::Post(&post.slug));
    let engagement = scoped.engagement();
    let reading = scoped.reading();
    let readings = || scoped.readings.iter().copied();

    PostReport {
        post: PostHeader {
            slug: post.slug.clone(),
            title: post.title.clone(),
            category: post.category.clone(),
            date: post.date.clone(),
        },
        overview: PostOverview {
            total_views: engagement.total_views,
            total_readings: reading.total_readings,
            total_ratings: engagement.total_ratings,
            completion_rate: reading.completion_rate,
            avg_scroll_depth: reading.avg_scroll_depth,
            avg_time: reading.avg_time,
            average_rating: engagement.average_rating,
            engagement_rate: engagement.engagement_rate,
        },
        scroll_depth_distribution: ScrollDepthDistribution::from_readings(readings()),
        time_distribution: TimeDistribution::from_readings(readings()),
        drop_off_curve: drop_off_curve(readings()),
        rating_distribution: scoped.rating_distribution(),
        trends: reading_trend(readings(), now),
    }
}

/// Rounds to one decimal place, halves away from zero.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// `100 * part / whole`, or 0 when `whole` is zero.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::domain::types::{Milestones, Rating, ScrollPercent, SessionId};

    const NOW: OffsetDateTime = datetime!(2024-01-15 12:00 UTC);

    fn post(slug: &str) -> Post {
        Post::parse(slug, "---\ncategory: notes\n---\nbody").expect("valid post")
    }

    fn view(slug: &str) -> View {
        View {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            timestamp: NOW,
            session_id: SessionId::generate(),
            user_agent: None,
        }
    }

    fn feedback_at(slug: &str, stars: u8, timestamp: OffsetDateTime) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            rating: Rating::new(stars).expect("valid rating"),
            timestamp,
            session_id: SessionId::generate(),
        }
    }

    fn feedback(slug: &str, stars: u8) -> Feedback {
        feedback_at(slug, stars, NOW)
    }

    fn reading(slug: &str, depth: u8, seconds: u32, exit: u8) -> ReadingAnalytics {
        let depth = ScrollPercent::new(depth).expect("valid depth");
        ReadingAnalytics {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            session_id: SessionId::generate(),
            timestamp: NOW,
            max_scroll_depth: depth,
            milestones: Milestones::from_depth(depth),
            time_on_page: seconds,
            exit_scroll_position: ScrollPercent::new(exit).expect("valid exit"),
            user_agent: None,
        }
    }

    #[test]
    fn single_post_summary_matches_hand_computation() {
        let events = EventSet {
            views: vec![view("a"), view("a"), view("a")],
            feedback: vec![feedback("a", 4), feedback("a", 2)],
            readings: Vec::new(),
        };
        let report = site_report(&[post("a")], &events, NOW);

        let row = &report.post_analytics[0];
        assert_eq!(row.total_views, 3);
        assert_eq!(row.total_ratings, 2);
        assert_eq!(row.average_rating, 3.0);
        assert_eq!(row.engagement_rate, 66.7);
        assert_eq!(row.rating_distribution.total(), row.total_ratings);
        assert_eq!(report.overall_stats.overall_engagement_rate, 66.7);
        assert_eq!(report.overall_stats.posts_with_feedback, 1);
    }

    #[test]
    fn grouping_by_slug_matches_scoped_filtering() {
        let events = EventSet {
            views: vec![view("a"), view("b"), view("a")],
            feedback: vec![feedback("b", 4)],
            readings: vec![reading("a", 90, 40, 80), reading("c", 10, 5, 10)],
        };
        let groups = events.by_slug();

        for slug in ["a", "b", "c"] {
            let grouped = &groups[slug];
            let scoped = events.scoped(AnalyticsScope::Post(slug));
            assert_eq!(grouped.engagement(), scoped.engagement());
            assert_eq!(grouped.reading(), scoped.reading());
        }
        assert!(!groups.contains_key("missing"));
    }

    #[test]
    fn views_for_unknown_slugs_count_only_overall() {
        let events = EventSet {
            views: vec![view("a"), view("retired"), view("retired")],
            ..EventSet::default()
        };
        let report = site_report(&[post("a")], &events, NOW);

        assert_eq!(report.overall_stats.total_views, 3);
        let per_post: u64 = report.post_analytics.iter().map(|p| p.total_views).sum();
        assert_eq!(per_post, 1);
    }

    #[test]
    fn no_views_means_zero_engagement() {
        let events = EventSet {
            feedback: vec![feedback("a", 5)],
            ..EventSet::default()
        };
        let report = site_report(&[post("a")], &events, NOW);

        assert_eq!(report.post_analytics[0].engagement_rate, 0.0);
        assert_eq!(report.overall_stats.overall_engagement_rate, 0.0);
        assert_eq!(report.overall_stats.average_rating, 5.0);
    }

    #[test]
    fn empty_event_log_yields_zeroes() {
        let report = site_report(&[post("a")], &EventSet::default(), NOW);
        let row = &report.post_analytics[0];
        assert_eq!(row.average_rating, 0.0);
        assert_eq!(row.completion_rate, 0.0);
        assert_eq!(row.avg_scroll_depth, 0);
        assert!(report.trends.is_empty());
        assert_eq!(report.overall_distribution.total(), 0);
    }

    #[test]
    fn posts_are_ranked_by_rating_count() {
        let events = EventSet {
            feedback: vec![feedback("b", 3), feedback("b", 4), feedback("c", 1)],
            ..EventSet::default()
        };
        let report = site_report(&[post("a"), post("b"), post("c")], &events, NOW);

        let order: Vec<&str> = report
            .post_analytics
            .iter()
            .map(|p| p.slug.as_str())
            .collect();
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[test]
    fn same_day_ratings_collapse_into_one_trend_point() {
        let now = datetime!(2024-01-20 00:00 UTC);
        let events = EventSet {
            feedback: vec![
                feedback_at("a", 5, datetime!(2024-01-01 08:00 UTC)),
                feedback_at("a", 3, datetime!(2024-01-01 21:15 UTC)),
            ],
            ..EventSet::default()
        };
        let report = site_report(&[post("a")], &events, now);

        assert_eq!(
            report.trends,
            vec![RatingTrendPoint {
                date: "2024-01-01".to_string(),
                count: 2,
                average_rating: 4.0,
            }]
        );
    }

    #[test]
    fn old_feedback_leaves_trends_but_not_totals() {
        let events = EventSet {
            feedback: vec![
                feedback_at("a", 4, NOW - time::Duration::days(45)),
                feedback_at("a", 2, NOW - time::Duration::days(1)),
            ],
            ..EventSet::default()
        };
        let report = site_report(&[post("a")], &events, NOW);

        assert_eq!(report.overall_stats.total_feedback, 2);
        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.trends[0].date, "2024-01-14");
    }

    #[test]
    fn post_report_buckets_cover_all_readings() {
        let events = EventSet {
            views: vec![view("a"), view("a")],
            feedback: vec![feedback("a", 5)],
            readings: vec![
                reading("a", 100, 29, 0),
                reading("a", 80, 30, 9),
                reading("a", 55, 299, 10),
                reading("a", 20, 300, 99),
                reading("other", 100, 10, 50),
            ],
        };
        let report = post_report(&post("a"), &events, NOW);

        assert_eq!(report.overview.total_readings, 4);
        assert_eq!(report.time_distribution.total(), 4);
        assert_eq!(report.time_distribution.under_30, 1);
        assert_eq!(report.time_distribution.from_30_to_60, 1);
        assert_eq!(report.time_distribution.from_180_to_300, 1);
        assert_eq!(report.time_distribution.over_300, 1);

        let dropped: u64 = report.drop_off_curve.iter().map(|b| b.count).sum();
        assert_eq!(dropped, 4);
        assert_eq!(report.drop_off_curve[0].count, 2);
        assert_eq!(report.drop_off_curve[1].count, 1);
        assert_eq!(report.drop_off_curve[9].count, 1);

        assert_eq!(report.scroll_depth_distribution.reached25, 3);
        assert_eq!(report.scroll_depth_distribution.reached100, 1);
        assert_eq!(report.overview.completion_rate, 25.0);
        assert_eq!(report.overview.avg_scroll_depth, 64);
        assert_eq!(report.overview.engagement_rate, 50.0);
        assert_eq!(report.post.category.as_deref(), Some("notes"));
    }

    #[test]
    fn exit_at_full_depth_lands_in_no_bucket() {
        let events = EventSet {
            readings: vec![reading("a", 100, 60, 100), reading("a", 40, 60, 35)],
            ..EventSet::default()
        };
        let report = post_report(&post("a"), &events, NOW);

        let dropped: u64 = report.drop_off_curve.iter().map(|b| b.count).sum();
        assert_eq!(dropped, 1);
        assert_eq!(report.overview.total_readings, 2);
    }

    #[test]
    fn reading_trend_reports_daily_completion() {
        let events = EventSet {
            readings: vec![
                reading("a", 100, 60, 100),
                reading("a", 100, 60, 100),
                reading("a", 10, 5, 10),
            ],
            ..EventSet::default()
        };
        let report = post_report(&post("a"), &events, NOW);

        assert_eq!(
            report.trends,
            vec![ReadingTrendPoint {
                date: "2024-01-15".to_string(),
                views: 3,
                completion_rate: 66.7,
            }]
        );
    }

    #[test]
    fn site_report_serializes_in_camel_case() {
        let events = EventSet {
            views: vec![view("a")],
            ..EventSet::default()
        };
        let value = serde_json::to_value(site_report(&[post("a")], &events, NOW))
            .expect("serializable");

        assert_eq!(value["overallStats"]["totalViews"], 1);
        assert_eq!(value["postAnalytics"][0]["category"], "notes");
        assert_eq!(value["overallDistribution"]["5"], 0);
    }
}

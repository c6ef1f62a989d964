use std::collections::BTreeMap;

use serde::Serialize;
use time::{
    Duration, OffsetDateTime, UtcOffset, format_description::FormatItem,
    macros::format_description,
};

use crate::domain::entities::{Feedback, ReadingAnalytics, Timestamped};

use super::{mean, percentage, round1};

/// Trailing window covered by trend series.
pub const TREND_WINDOW: Duration = Duration::days(30);

const DATE_KEY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingTrendPoint {
    pub date: String,
    pub count: u64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingTrendPoint {
    pub date: String,
    pub views: u64,
    pub completion_rate: f64,
}

/// `YYYY-MM-DD` of the instant in UTC, whatever offset it was recorded in.
pub fn utc_date_key(timestamp: OffsetDateTime) -> Option<String> {
    timestamp
        .to_offset(UtcOffset::UTC)
        .date()
        .format(DATE_KEY_FORMAT)
        .ok()
}

/// Folds items from the trailing window into per-day accumulators, keyed
/// and ordered by UTC date string.
fn group_by_utc_date<'a, T, A, F>(
    items: impl IntoIterator<Item = &'a T>,
    now: OffsetDateTime,
    mut fold: F,
) -> BTreeMap<String, A>
where
    T: Timestamped + 'a,
    A: Default,
    F: FnMut(&mut A, &T),
{
    let cutoff = now - TREND_WINDOW;
    let mut groups = BTreeMap::new();
    for item in items {
        let timestamp = item.timestamp();
        if timestamp < cutoff {
            continue;
        }
        let Some(key) = utc_date_key(timestamp) else {
            continue;
        };
        fold(groups.entry(key).or_default(), item);
    }
    groups
}

pub fn rating_trend<'a>(
    feedback: impl IntoIterator<Item = &'a Feedback>,
    now: OffsetDateTime,
) -> Vec<RatingTrendPoint> {
    group_by_utc_date(feedback, now, |acc: &mut (usize, u64), entry: &Feedback| {
        acc.0 += 1;
        acc.1 += u64::from(entry.rating.get());
    })
    .into_iter()
    .map(|(date, (count, sum))| RatingTrendPoint {
        date,
        count: count as u64,
        average_rating: round1(mean(sum as f64, count)),
    })
    .collect()
}

pub fn reading_trend<'a>(
    readings: impl IntoIterator<Item = &'a ReadingAnalytics>,
    now: OffsetDateTime,
) -> Vec<ReadingTrendPoint> {
    group_by_utc_date(
        readings,
        now,
        |acc: &mut (usize, usize), reading: &ReadingAnalytics| {
            acc.0 += 1;
            acc.1 += usize::from(reading.completed());
        },
    )
    .into_iter()
    .map(|(date, (views, completions))| ReadingTrendPoint {
        date,
        views: views as u64,
        completion_rate: round1(percentage(completions, views)),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn date_key_uses_utc_calendar_day() {
        let late_evening_west = datetime!(2024-01-01 22:30 -05:00);
        assert_eq!(utc_date_key(late_evening_west).as_deref(), Some("2024-01-02"));
    }
}

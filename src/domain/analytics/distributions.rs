use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::domain::entities::{Feedback, ReadingAnalytics};
use crate::domain::types::Rating;

/// Upper bounds (exclusive) of the time-on-page buckets, in seconds. A
/// sixth, open-ended bucket holds everything at or above the last bound.
pub const TIME_BUCKET_BOUNDS: [u32; 5] = [30, 60, 120, 180, 300];

pub const DROP_OFF_BUCKET_WIDTH: u8 = 10;
pub const DROP_OFF_BUCKET_COUNT: usize = 10;

/// Count of ratings per star value. Serializes as `{"1": n, ..., "5": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatingDistribution {
    counts: [u64; 5],
}

impl RatingDistribution {
    pub fn from_feedback<'a>(feedback: impl IntoIterator<Item = &'a Feedback>) -> Self {
        let mut counts = [0u64; 5];
        for entry in feedback {
            counts[usize::from(entry.rating.get() - Rating::MIN)] += 1;
        }
        Self { counts }
    }

    pub fn count(&self, stars: u8) -> u64 {
        stars
            .checked_sub(Rating::MIN)
            .and_then(|index| self.counts.get(usize::from(index)))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl Serialize for RatingDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (index, count) in self.counts.iter().enumerate() {
            map.serialize_entry(&(index + 1).to_string(), count)?;
        }
        map.end()
    }
}

/// How many reading sessions passed each scroll milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollDepthDistribution {
    pub reached25: u64,
    pub reached50: u64,
    pub reached75: u64,
    pub reached100: u64,
}

impl ScrollDepthDistribution {
    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a ReadingAnalytics>) -> Self {
        readings
            .into_iter()
            .fold(Self::default(), |mut acc, reading| {
                let m = reading.milestones;
                acc.reached25 += u64::from(m.reached25);
                acc.reached50 += u64::from(m.reached50);
                acc.reached75 += u64::from(m.reached75);
                acc.reached100 += u64::from(m.reached100);
                acc
            })
    }
}

/// Reading sessions by time on page, half-open buckets
/// `[0,30) [30,60) [60,120) [120,180) [180,300) [300,∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimeDistribution {
    #[serde(rename = "under30")]
    pub under_30: u64,
    #[serde(rename = "30to60")]
    pub from_30_to_60: u64,
    #[serde(rename = "60to120")]
    pub from_60_to_120: u64,
    #[serde(rename = "120to180")]
    pub from_120_to_180: u64,
    #[serde(rename = "180to300")]
    pub from_180_to_300: u64,
    #[serde(rename = "over300")]
    pub over_300: u64,
}

impl TimeDistribution {
    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a ReadingAnalytics>) -> Self {
        let mut buckets = [0u64; TIME_BUCKET_BOUNDS.len() + 1];
        for reading in readings {
            buckets[time_bucket(reading.time_on_page)] += 1;
        }
        Self {
            under_30: buckets[0],
            from_30_to_60: buckets[1],
            from_60_to_120: buckets[2],
            from_120_to_180: buckets[3],
            from_180_to_300: buckets[4],
            over_300: buckets[5],
        }
    }

    pub fn total(&self) -> u64 {
        self.under_30
            + self.from_30_to_60
            + self.from_60_to_120
            + self.from_120_to_180
            + self.from_180_to_300
            + self.over_300
    }
}

fn time_bucket(seconds: u32) -> usize {
    TIME_BUCKET_BOUNDS
        .iter()
        .position(|&bound| seconds < bound)
        .unwrap_or(TIME_BUCKET_BOUNDS.len())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropOffBucket {
    pub position: String,
    pub count: u64,
}

/// Exit positions grouped into ten `[start, start+10)` bins. An exit at
/// exactly 100% falls outside every bin.
pub fn drop_off_curve<'a>(
    readings: impl IntoIterator<Item = &'a ReadingAnalytics>,
) -> Vec<DropOffBucket> {
    let mut counts = [0u64; DROP_OFF_BUCKET_COUNT];
    for reading in readings {
        let index = usize::from(reading.exit_scroll_position.get() / DROP_OFF_BUCKET_WIDTH);
        if let Some(slot) = counts.get_mut(index) {
            *slot += 1;
        }
    }

    counts
        .iter()
        .enumerate()
        .map(|(index, &count)| {
            let start = index * usize::from(DROP_OFF_BUCKET_WIDTH);
            let end = start + usize::from(DROP_OFF_BUCKET_WIDTH);
            DropOffBucket {
                position: format!("{start}-{end}%"),
                count,
            }
        })
        .collect()
}

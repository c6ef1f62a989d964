//! Client-side reading tracker.
//!
//! Accumulates scroll depth over a visit and produces exactly one
//! [`ReadingReport`] when the visit ends. `finish` consumes the tracker, so
//! the one-send-per-visit rule is enforced by ownership.

use std::time::Duration;

use serde::Serialize;

use super::types::{Milestones, ScrollPercent, SessionId};

/// Distance from the bottom of the document, in pixels, treated as fully read.
pub const BOTTOM_TOLERANCE_PX: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct ReadingTracker {
    slug: String,
    session_id: SessionId,
    max_depth: ScrollPercent,
}

/// Payload sent to the reading-analytics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingReport {
    pub slug: String,
    pub session_id: SessionId,
    pub max_scroll_depth: u8,
    #[serde(flatten)]
    pub milestones: Milestones,
    pub time_on_page: u64,
    pub exit_scroll_position: u8,
}

/// Scroll depth for one viewport position.
pub fn scroll_depth(scroll_top: f64, viewport_height: f64, document_height: f64) -> ScrollPercent {
    let track_height = document_height - viewport_height;
    if track_height <= 0.0 {
        return ScrollPercent::FULL;
    }
    if scroll_top + viewport_height >= document_height - BOTTOM_TOLERANCE_PX {
        return ScrollPercent::FULL;
    }
    ScrollPercent::saturating(scroll_top / track_height * 100.0)
}

impl ReadingTracker {
    pub fn new(slug: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            slug: slug.into(),
            session_id,
            max_depth: ScrollPercent::default(),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn max_depth(&self) -> ScrollPercent {
        self.max_depth
    }

    /// Records a scroll position and returns the depth it represents.
    pub fn observe(
        &mut self,
        scroll_top: f64,
        viewport_height: f64,
        document_height: f64,
    ) -> ScrollPercent {
        let depth = scroll_depth(scroll_top, viewport_height, document_height);
        self.max_depth = self.max_depth.max(depth);
        depth
    }

    pub fn finish(self, time_on_page: Duration, exit_depth: ScrollPercent) -> ReadingReport {
        // whole seconds, rounded like the browser tracker
        let seconds = (time_on_page.as_millis() + 500) / 1000;
        ReadingReport {
            slug: self.slug,
            session_id: self.session_id,
            max_scroll_depth: self.max_depth.get(),
            milestones: Milestones::from_depth(self.max_depth),
            time_on_page: u64::try_from(seconds).unwrap_or(u64::MAX),
            exit_scroll_position: exit_depth.get(),
        }
    }
}

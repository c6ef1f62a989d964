use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Sliding-window limiter for telemetry ingestion, keyed by client and route.
#[derive(Debug, Clone)]
pub struct IngestRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl IngestRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn check(&self, client: &str, route: &str) -> RateDecision {
        self.check_at(client, route, Instant::now())
    }

    pub fn check_at(&self, client: &str, route: &str, now: Instant) -> RateDecision {
        let bucket_key = format!("{client}:{route}");
        let window = self.window;

        let mut entry = self.buckets.entry(bucket_key).or_default();
        entry.retain(|instant| now.saturating_duration_since(*instant) < window);

        if entry.len() as u32 >= self.max_requests {
            // the oldest hit leaves the window first
            let retry_after = entry
                .first()
                .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision::Limited { retry_after };
        }

        entry.push(now);
        RateDecision::Allowed {
            remaining: self.max_requests - entry.len() as u32,
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use margin::application::analytics::AnalyticsService;
use margin::application::ingest::{
    DEFAULT_VIEW_DEDUP_WINDOW, FeedbackSubmission, IngestService, ReadingSubmission,
    ViewSubmission,
};
use margin::application::repos::{EventStores, PostsRepo};
use margin::infra::content::MarkdownDirectory;
use margin::infra::memory::MemoryEventStore;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

#[tokio::test]
async fn ingestion_and_reports_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let stores = EventStores::from_backend(Arc::new(MemoryEventStore::new()));
    let ingest = IngestService::new(
        stores.views.clone(),
        stores.feedback.clone(),
        stores.readings.clone(),
        DEFAULT_VIEW_DEDUP_WINDOW,
    );

    let view = ViewSubmission {
        slug: Some("post".to_string()),
        session_id: Some("session".to_string()),
        user_agent: None,
    };
    ingest.record_view(view.clone()).await.expect("first view");
    ingest.record_view(view).await.expect("repeat view");
    ingest
        .record_feedback(FeedbackSubmission {
            slug: Some("post".to_string()),
            rating: Some(5.0),
            session_id: None,
        })
        .await
        .expect("feedback");
    ingest
        .record_reading(ReadingSubmission {
            slug: Some("post".to_string()),
            max_scroll_depth: Some(80.0),
            time_on_page: Some(31.0),
            ..Default::default()
        })
        .await
        .expect("reading");

    let dir = tempfile::tempdir().expect("tempdir");
    let posts: Arc<dyn PostsRepo> = Arc::new(MarkdownDirectory::new(dir.path()));
    let analytics = AnalyticsService::new(
        posts,
        stores.views.clone(),
        stores.feedback.clone(),
        stores.readings.clone(),
    );
    analytics.site_report().await.expect("site report");

    let snapshot = snapshotter.snapshot().into_vec();
    let names: Vec<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    let counters: HashMap<String, u64> = snapshot
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    assert_eq!(counters.get("margin_views_recorded_total"), Some(&1));
    assert_eq!(counters.get("margin_views_deduplicated_total"), Some(&1));
    assert_eq!(counters.get("margin_feedback_recorded_total"), Some(&1));
    assert_eq!(counters.get("margin_reading_recorded_total"), Some(&1));

    assert!(
        names.iter().any(|name| name == "margin_analytics_compute_ms"),
        "missing metric: margin_analytics_compute_ms"
    );
}

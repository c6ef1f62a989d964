use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use margin::application::analytics::AnalyticsService;
use margin::application::dashboard::DashboardGate;
use margin::application::ingest::{DEFAULT_VIEW_DEDUP_WINDOW, IngestService};
use margin::application::posts::PostService;
use margin::application::repos::{EventStores, PostsRepo};
use margin::infra::content::MarkdownDirectory;
use margin::infra::http::{self, ApiState, HttpState, IngestRateLimiter, RouterState};
use margin::infra::memory::MemoryEventStore;

const PASSWORD: &str = "hunter2";

struct TestApp {
    router: Router,
    _posts: TempDir,
}

fn write_post(dir: &TempDir, slug: &str, source: &str) {
    std::fs::write(dir.path().join(format!("{slug}.md")), source).expect("write post");
}

fn build_app(password: Option<&str>, max_requests: u32) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    write_post(
        &dir,
        "hello-world",
        "---\ntitle: Hello World\ndate: 2024-01-02\ncategory: notes\n---\nFirst post body.\n",
    );
    write_post(
        &dir,
        "second",
        "---\ndate: 2024-03-01\n---\n# Second Post\n\nAnother body.\n",
    );
    std::fs::write(dir.path().join("README.md"), "not a post").expect("write readme");

    let stores = EventStores::from_backend(Arc::new(MemoryEventStore::new()));
    let posts: Arc<dyn PostsRepo> = Arc::new(MarkdownDirectory::new(dir.path()));

    let api = ApiState {
        analytics: Arc::new(AnalyticsService::new(
            posts.clone(),
            stores.views.clone(),
            stores.feedback.clone(),
            stores.readings.clone(),
        )),
        ingest: Arc::new(IngestService::new(
            stores.views.clone(),
            stores.feedback.clone(),
            stores.readings.clone(),
            DEFAULT_VIEW_DEDUP_WINDOW,
        )),
        posts: Arc::new(PostService::new(posts)),
        dashboard: Arc::new(DashboardGate::new(password)),
        rate_limiter: Arc::new(IngestRateLimiter::new(
            Duration::from_secs(60),
            max_requests,
        )),
    };
    let state = RouterState {
        http: HttpState {
            store: stores.health.clone(),
        },
        api,
    };

    TestApp {
        router: http::build_router(state),
        _posts: dir,
    }
}

fn open_app() -> TestApp {
    build_app(None, 120)
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_reports_no_content() {
    let app = open_app();
    let (status, headers, _) = send(&app, get("/_health")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn posts_are_listed_newest_first_without_readme() {
    let app = open_app();
    let (status, _, body) = send(&app, get("/posts")).await;
    assert_eq!(status, StatusCode::OK);

    let slugs: Vec<&str> = body
        .as_array()
        .expect("array")
        .iter()
        .map(|post| post["slug"].as_str().expect("slug"))
        .collect();
    assert_eq!(slugs, vec!["second", "hello-world"]);
    assert_eq!(body[0]["title"], "Second Post");
    assert_eq!(body[1]["readingTime"], "1 min read");
    assert!(body[0].get("content").is_none());
}

#[tokio::test]
async fn single_post_and_missing_post() {
    let app = open_app();
    let (status, _, body) = send(&app, get("/posts/hello-world")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Hello World");
    assert_eq!(body["category"], "notes");
    assert!(body["content"].as_str().expect("content").contains("First post body."));

    let (status, _, body) = send(&app, get("/posts/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Post not found"}));
}

#[tokio::test]
async fn feedback_is_validated_and_stored() {
    let app = open_app();

    let (status, _, body) = send(
        &app,
        post_json("/feedback", json!({"slug": "hello-world", "rating": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid feedback data"}));

    let (status, _, body) = send(
        &app,
        post_json("/feedback", json!({"slug": "hello-world", "rating": 4.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid feedback data");

    let (status, _, body) = send(
        &app,
        post_json(
            "/feedback",
            json!({"slug": "hello-world", "rating": 4, "sessionId": "s-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["feedback"]["rating"], 4);
    assert_eq!(body["feedback"]["sessionId"], "s-1");

    let (status, _, body) = send(&app, get("/feedback")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("array").len(), 1);
}

#[tokio::test]
async fn malformed_json_gets_the_validation_message() {
    let app = open_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/reading-analytics")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid analytics data"}));
}

#[tokio::test]
async fn repeat_views_within_window_are_not_counted() {
    let app = open_app();
    let view = json!({"slug": "hello-world", "sessionId": "reader-1"});

    let (status, _, first) = send(&app, post_json("/views", view.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["counted"], true);
    assert_eq!(first["view"]["userAgent"], "Unknown");

    let (_, _, second) = send(&app, post_json("/views", view)).await;
    assert_eq!(second["success"], true);
    assert_eq!(second["counted"], false);
    assert!(second.get("view").is_none());

    let (_, _, other_session) = send(
        &app,
        post_json("/views", json!({"slug": "hello-world", "sessionId": "reader-2"})),
    )
    .await;
    assert_eq!(other_session["counted"], true);

    let (_, _, views) = send(&app, get("/views")).await;
    assert_eq!(views.as_array().expect("array").len(), 2);
}

#[tokio::test]
async fn missing_session_id_is_minted_and_echoed() {
    let app = open_app();
    let (status, _, body) = send(&app, post_json("/views", json!({"slug": "second"}))).await;
    assert_eq!(status, StatusCode::OK);
    let session = body["sessionId"].as_str().expect("session id");
    assert!(!session.is_empty());
    assert_eq!(body["view"]["sessionId"], session);
}

#[tokio::test]
async fn reading_sessions_drive_the_post_report() {
    let app = open_app();

    for (session, depth, time) in [("a", 100, 200), ("b", 40, 20)] {
        let (status, _, body) = send(
            &app,
            post_json(
                "/reading-analytics",
                json!({
                    "slug": "hello-world",
                    "sessionId": session,
                    "maxScrollDepth": depth,
                    "timeOnPage": time,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, _, _) = send(
        &app,
        post_json(
            "/reading-analytics",
            json!({"slug": "hello-world", "maxScrollDepth": 120, "timeOnPage": 5}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, report) = send(&app, get("/analytics/hello-world")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["post"]["title"], "Hello World");
    assert_eq!(report["overview"]["totalReadings"], 2);
    assert_eq!(report["overview"]["completionRate"], 50.0);
    assert_eq!(report["overview"]["avgScrollDepth"], 70);
    assert_eq!(report["scrollDepthDistribution"]["reached25"], 2);
    assert_eq!(report["scrollDepthDistribution"]["reached100"], 1);
    assert_eq!(report["timeDistribution"]["under30"], 1);
    assert_eq!(report["timeDistribution"]["180to300"], 1);

    let drop_off = report["dropOffCurve"].as_array().expect("array");
    assert_eq!(drop_off.len(), 10);
    assert_eq!(drop_off[4]["position"], "40-50%");
    assert_eq!(drop_off[4]["count"], 1);

    let trends = report["trends"].as_array().expect("array");
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0]["views"], 2);
}

#[tokio::test]
async fn site_report_joins_events_to_posts() {
    let app = open_app();
    for session in ["a", "b", "c"] {
        send(
            &app,
            post_json("/views", json!({"slug": "hello-world", "sessionId": session})),
        )
        .await;
    }
    send(
        &app,
        post_json("/views", json!({"slug": "deleted-post", "sessionId": "a"})),
    )
    .await;
    for rating in [4, 2] {
        send(
            &app,
            post_json("/feedback", json!({"slug": "hello-world", "rating": rating})),
        )
        .await;
    }

    let (status, _, report) = send(&app, get("/analytics")).await;
    assert_eq!(status, StatusCode::OK);

    let stats = &report["overallStats"];
    assert_eq!(stats["totalViews"], 4);
    assert_eq!(stats["totalFeedback"], 2);
    assert_eq!(stats["totalPosts"], 2);
    assert_eq!(stats["averageRating"], 3.0);
    assert_eq!(stats["postsWithFeedback"], 1);

    let top = &report["postAnalytics"][0];
    assert_eq!(top["slug"], "hello-world");
    assert_eq!(top["totalViews"], 3);
    assert_eq!(top["totalRatings"], 2);
    assert_eq!(top["engagementRate"], 66.7);
    assert_eq!(top["ratingDistribution"]["4"], 1);

    assert_eq!(report["overallDistribution"]["2"], 1);
    assert_eq!(report["trends"][0]["count"], 2);
}

#[tokio::test]
async fn unknown_post_report_is_not_found() {
    let app = open_app();
    let (status, _, body) = send(&app, get("/analytics/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Post not found"}));
}

#[tokio::test]
async fn dashboard_reads_require_the_password() {
    let app = build_app(Some(PASSWORD), 120);

    let (status, _, body) = send(&app, get("/analytics")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Dashboard password required"}));

    let wrong = Request::builder()
        .uri("/views")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = Request::builder()
        .uri("/analytics")
        .header(header::AUTHORIZATION, format!("Bearer {PASSWORD}"))
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&app, bearer).await;
    assert_eq!(status, StatusCode::OK);

    let custom = Request::builder()
        .uri("/feedback")
        .header("x-dashboard-password", PASSWORD)
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&app, custom).await;
    assert_eq!(status, StatusCode::OK);

    // ingestion and content stay public
    let (status, _, _) = send(&app, post_json("/views", json!({"slug": "second"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, get("/posts")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ingestion_is_rate_limited_per_client() {
    let app = build_app(None, 2);
    let request = |session: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/views")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-session-id", session)
            .body(Body::from(json!({"slug": "second"}).to_string()))
            .expect("request")
    };

    let (status, headers, _) = send(&app, request("busy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "1");
    send(&app, request("busy")).await;

    let (status, headers, body) = send(&app, request("busy")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"error": "Rate limit exceeded"}));
    assert!(headers.contains_key(header::RETRY_AFTER));

    let (status, _, _) = send(&app, request("quiet")).await;
    assert_eq!(status, StatusCode::OK);
}

//! Postgres event store round trips. Needs `DATABASE_URL`; run with
//! `cargo test -- --ignored`.

use margin::application::repos::{FeedbackRepo, ReadingAnalyticsRepo, StoreHealth, ViewsRepo};
use margin::domain::entities::{Feedback, ReadingAnalytics, View};
use margin::domain::types::{Milestones, Rating, ScrollPercent, SessionId};
use margin::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

fn session(raw: &str) -> SessionId {
    SessionId::parse(raw)
        .expect("valid session")
        .expect("non-blank session")
}

fn view(slug: &str, session_id: &str, timestamp: OffsetDateTime) -> View {
    View {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        timestamp,
        session_id: session(session_id),
        user_agent: Some("test-agent".to_string()),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn views_list_newest_first_and_dedup_window_is_exclusive(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    repos.ping().await.expect("ping");

    let older = view("post", "s1", datetime!(2024-01-01 10:00 UTC));
    let newer = view("post", "s1", datetime!(2024-01-01 11:00 UTC));
    let other = view("other", "s2", datetime!(2024-01-01 12:00 UTC));
    for row in [&older, &newer, &other] {
        repos.insert_view(row).await.expect("insert view");
    }

    let all = repos.list_views().await.expect("list");
    assert_eq!(all, vec![other.clone(), newer.clone(), older.clone()]);

    let by_slug = repos.list_views_by_slug("post").await.expect("list by slug");
    assert_eq!(by_slug, vec![newer.clone(), older]);

    let sid = session("s1");
    assert!(
        repos
            .view_exists_since(&sid, "post", newer.timestamp - Duration::minutes(30))
            .await
            .expect("exists")
    );
    assert!(
        !repos
            .view_exists_since(&sid, "post", newer.timestamp)
            .await
            .expect("exists")
    );
    assert!(
        !repos
            .view_exists_since(&sid, "other", datetime!(2023-12-31 00:00 UTC))
            .await
            .expect("exists")
    );

    assert_eq!(repos.delete_all_views().await.expect("delete"), 3);
    assert!(repos.list_views().await.expect("list").is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn feedback_and_readings_round_trip(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let feedback = Feedback {
        id: Uuid::new_v4(),
        slug: "post".to_string(),
        rating: Rating::new(4).expect("rating"),
        timestamp: datetime!(2024-02-01 08:30 UTC),
        session_id: session("s1"),
    };
    repos.insert_feedback(&feedback).await.expect("insert feedback");
    assert_eq!(
        repos.list_feedback_by_slug("post").await.expect("list"),
        vec![feedback]
    );

    let depth = ScrollPercent::new(80).expect("depth");
    let reading = ReadingAnalytics {
        id: Uuid::new_v4(),
        slug: "post".to_string(),
        session_id: session("s1"),
        timestamp: datetime!(2024-02-01 08:35 UTC),
        max_scroll_depth: depth,
        milestones: Milestones::from_depth(depth),
        time_on_page: 95,
        exit_scroll_position: ScrollPercent::new(60).expect("exit"),
        user_agent: None,
    };
    repos.insert_reading(&reading).await.expect("insert reading");
    assert_eq!(repos.list_readings().await.expect("list"), vec![reading]);

    assert_eq!(repos.delete_all_feedback().await.expect("delete"), 1);
    assert_eq!(repos.delete_all_readings().await.expect("delete"), 1);
}

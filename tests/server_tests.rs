use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use algoduel::config::{ExecutionConfig, GameConfig, ProblemConfig};
use algoduel::database as db;
use algoduel::events::CommsHub;
use algoduel::harness::{Harness, TestCase};
use algoduel::matches::MatchManager;
use algoduel::queue::{Category, WaitingQueues};
use algoduel::web_server::register_routes;

struct TestContext {
    pool: Arc<SqlitePool>,
    queues: Arc<Mutex<WaitingQueues>>,
    manager: Arc<MatchManager>,
    hub: Arc<CommsHub>,
    harness: Arc<Harness>,
}

fn test_case(test_id: &str, input: &str, expected: &str) -> TestCase {
    TestCase {
        test_id: test_id.to_string(),
        input: input.to_string(),
        expected_output: expected.to_string(),
    }
}

fn test_problems() -> Vec<ProblemConfig> {
    vec![
        ProblemConfig {
            id: 1,
            title: "Missing Number".to_string(),
            category: Category::Array,
            description: "Return the missing number.".to_string(),
            test_cases: vec![
                test_case("1", "[1, 2, 4, 5, 6]", "3"),
                test_case("2", "[3, 7, 1, 2, 8, 4, 5]", "6"),
            ],
        },
        ProblemConfig {
            id: 2,
            title: "Level Order".to_string(),
            category: Category::Tree,
            description: String::new(),
            test_cases: vec![test_case(
                "1",
                r#"{ "tree": [3, 9, 20, null, null, 15, 7] }"#,
                "[[3], [9, 20], [15, 7]]",
            )],
        },
    ]
}

async fn test_context() -> TestContext {
    let pool = Arc::new(db::init_pool("sqlite::memory:").await.unwrap());
    db::seed_problems(&pool, &test_problems()).await.unwrap();

    let hub = Arc::new(CommsHub::new());
    let manager = Arc::new(MatchManager::new(
        Arc::clone(&pool),
        Arc::clone(&hub),
        CancellationToken::new(),
    ));
    let queues = Arc::new(Mutex::new(WaitingQueues::new()));
    let harness = Arc::new(Harness::new(&ExecutionConfig {
        timeout_secs: 2,
        max_concurrent: 2,
    }));

    TestContext {
        pool,
        queues,
        manager,
        hub,
        harness,
    }
}

macro_rules! test_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from(Arc::clone(&$ctx.pool)))
                .app_data(web::Data::from(Arc::clone(&$ctx.queues)))
                .app_data(web::Data::from(Arc::clone(&$ctx.manager)))
                .app_data(web::Data::from(Arc::clone(&$ctx.hub)))
                .app_data(web::Data::from(Arc::clone(&$ctx.harness)))
                .app_data(web::Data::new(GameConfig {
                    match_duration_secs: 600,
                }))
                .configure(register_routes),
        )
        .await
    };
}

macro_rules! join_queue {
    ($app:expr, $sid:expr, $pid:expr, $name:expr, $category:expr) => {{
        let req = test::TestRequest::post()
            .uri("/queue/join")
            .set_json(json!({
                "session_id": $sid,
                "player_id": $pid,
                "player_name": $name,
                "category": $category,
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&$app, req).await;
        body
    }};
}

macro_rules! drain_events {
    ($app:expr, $sid:expr) => {{
        let req = test::TestRequest::get()
            .uri(&format!("/sessions/{}/events", $sid))
            .to_request();
        let body: Value = test::call_and_read_body_json(&$app, req).await;
        body.as_array().cloned().unwrap_or_default()
    }};
}

async fn persisted_matches(pool: &SqlitePool, match_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM matches WHERE id = ?")
        .bind(match_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[actix_web::test]
async fn pairing_notifies_both_players_without_cross_category_interference() {
    let ctx = test_context().await;
    let app = test_app!(ctx);

    let body = join_queue!(app, "s1", "p1", "Alice", "array");
    assert_eq!(body["status"], "waiting");

    // A tree player must not interfere with the array pairing
    let body = join_queue!(app, "s2", "p2", "Bob", "tree");
    assert_eq!(body["status"], "waiting");

    let body = join_queue!(app, "s3", "p3", "Carol", "array");
    assert_eq!(body["status"], "matched");

    let events = drain_events!(app, "s1");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "match_found");
    assert_eq!(events[0]["data"]["opponent"]["id"], "p3");
    assert_eq!(events[0]["data"]["total_tests"], 2);
    assert_eq!(events[0]["data"]["problem"]["category"], "array");

    let events = drain_events!(app, "s3");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["data"]["opponent"]["id"], "p1");

    assert!(drain_events!(app, "s2").is_empty());
}

#[actix_web::test]
async fn unrecognized_category_is_rejected() {
    let ctx = test_context().await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/queue/join")
        .set_json(json!({
            "session_id": "s1",
            "player_id": "p1",
            "player_name": "Alice",
            "category": "dynamic-programming",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_json_diff::assert_json_eq!(body, json!({ "reason": "ERR_INVALID_ARGUMENT", "code": 1 }));
}

/// Pairs two array players and returns the match id taken from the first
/// player's match_found event.
macro_rules! start_array_match {
    ($app:expr) => {{
        join_queue!($app, "s1", "p1", "Alice", "array");
        join_queue!($app, "s3", "p3", "Carol", "array");
        let events = drain_events!($app, "s1");
        drain_events!($app, "s3");
        events[0]["data"]["match_id"].as_str().unwrap().to_string()
    }};
}

#[actix_web::test]
async fn progress_reports_reach_the_opponent_only() {
    let ctx = test_context().await;
    let app = test_app!(ctx);
    let match_id = start_array_match!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/matches/{match_id}/progress"))
        .set_json(json!({
            "session_id": "s1",
            "player_id": "p1",
            "tests_passed": 1,
            "total_tests": 2,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "recorded");

    let events = drain_events!(app, "s3");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "opponent_progress");
    assert_eq!(events[0]["data"]["tests_passed"], 1);

    assert!(drain_events!(app, "s1").is_empty());
}

#[actix_web::test]
async fn submission_runs_the_harness_and_feeds_progress() {
    let ctx = test_context().await;
    let app = test_app!(ctx);
    let match_id = start_array_match!(app);

    let solution = r#"
fn solve(nums) {
    let n = nums.len() + 1;
    let expected = n * (n + 1) / 2;
    let actual = 0;
    for x in nums {
        actual += x;
    }
    expected - actual
}
"#;
    let req = test::TestRequest::post()
        .uri(&format!("/matches/{match_id}/submissions"))
        .set_json(json!({
            "session_id": "s1",
            "player_id": "p1",
            "code": solution,
        }))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["passed"], 2);
    assert_eq!(report["total"], 2);
    assert_eq!(report["errors"], json!([]));
    assert_eq!(report["test_results"].as_array().unwrap().len(), 2);

    let events = drain_events!(app, "s3");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "opponent_progress");
    assert_eq!(events[0]["data"]["tests_passed"], 2);
}

#[actix_web::test]
async fn broken_submission_still_returns_a_well_formed_report() {
    let ctx = test_context().await;
    let app = test_app!(ctx);
    let match_id = start_array_match!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/matches/{match_id}/submissions"))
        .set_json(json!({
            "session_id": "s1",
            "player_id": "p1",
            "code": "fn solve( {",
        }))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["passed"], 0);
    assert_eq!(report["total"], 2);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);
    assert_eq!(report["test_results"], json!([]));
}

#[actix_web::test]
async fn disconnect_ends_the_match_exactly_once() {
    let ctx = test_context().await;
    let app = test_app!(ctx);
    let match_id = start_array_match!(app);

    let req = test::TestRequest::post()
        .uri("/sessions/s1/disconnect")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "disconnected");

    let events = drain_events!(app, "s3");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "match_ended");
    assert_eq!(events[0]["data"]["winner_id"], Value::Null);

    // The second trigger is a no-op: one terminal row, no second broadcast
    let req = test::TestRequest::post()
        .uri("/sessions/s3/disconnect")
        .to_request();
    test::call_service(&app, req).await;

    assert_eq!(persisted_matches(&ctx.pool, &match_id).await, 1);
    assert!(ctx.manager.get(&match_id).is_none());
    let still_waiting = {
        let queues = ctx.queues.lock();
        queues.waiting(Category::Array) + queues.waiting(Category::Random)
    };
    assert_eq!(still_waiting, 0);
}

#[actix_web::test]
async fn timer_expiry_delivers_match_ended_to_the_group() {
    let ctx = test_context().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(Arc::clone(&ctx.pool)))
            .app_data(web::Data::from(Arc::clone(&ctx.queues)))
            .app_data(web::Data::from(Arc::clone(&ctx.manager)))
            .app_data(web::Data::from(Arc::clone(&ctx.hub)))
            .app_data(web::Data::from(Arc::clone(&ctx.harness)))
            .app_data(web::Data::new(GameConfig {
                match_duration_secs: 0,
            }))
            .configure(register_routes),
    )
    .await;

    join_queue!(app, "s1", "p1", "Alice", "array");
    join_queue!(app, "s3", "p3", "Carol", "array");
    let events = drain_events!(app, "s1");
    let match_id = events[0]["data"]["match_id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(ctx.manager.get(&match_id).is_none());
    assert_eq!(persisted_matches(&ctx.pool, &match_id).await, 1);
    let events = drain_events!(app, "s3");
    assert!(
        events
            .iter()
            .any(|event| event["event"] == "match_ended")
    );
}

//! HTTP surface specifications: the router must never serve a stale status,
//! and the operator endpoints must expose the engine's checks and stats.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use posfin::clock::{Clock, ManualClock};
use posfin::config::{EngineConfig, LedgerConfig};
use posfin::engine::EngineHandle;
use posfin::lifecycle::{ApplicationId, ApplicationSeed, InMemoryMarketStore};
use posfin::router::engine_router;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .expect("valid start time")
}

fn harness() -> (axum::Router, Arc<InMemoryMarketStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(start_time()));
    let store = Arc::new(InMemoryMarketStore::default());
    let engine = EngineHandle::new(
        Arc::clone(&store),
        Arc::clone(&store),
        clock.clone() as Arc<dyn Clock>,
        EngineConfig::default(),
        LedgerConfig::default(),
    );
    (engine_router(engine), store, clock)
}

async fn get_json(router: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router dispatch");
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    (status, serde_json::from_slice(&body).expect("json"))
}

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
                .expect("request"),
        )
        .await
        .expect("router dispatch");
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    (status, serde_json::from_slice(&body).expect("json"))
}

#[tokio::test]
async fn status_endpoint_corrects_drift_before_answering() {
    let (router, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    clock.advance(Duration::hours(50));

    let (status, payload) = get_json(&router, "/api/v1/applications/app-1/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("status"), Some(&Value::String("ignored".to_string())));
    assert_eq!(payload.get("was_corrected"), Some(&Value::Bool(true)));

    // A second read sees the already-correct status.
    let (_, payload) = get_json(&router, "/api/v1/applications/app-1/status").await;
    assert_eq!(payload.get("was_corrected"), Some(&Value::Bool(false)));
}

#[tokio::test]
async fn unknown_application_is_an_explicit_not_found() {
    let (router, _, _) = harness();
    let (status, payload) = get_json(&router, "/api/v1/applications/app-missing/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(payload.get("error").is_some());
}

#[tokio::test]
async fn reactivation_endpoint_reopens_an_ignored_application() {
    let (router, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    clock.advance(Duration::hours(50));
    // Settle it to ignored first.
    get_json(&router, "/api/v1/applications/app-1/status").await;

    let (status, payload) =
        post_json(&router, "/api/v1/applications/app-1/reactivate", Value::Null).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload.get("status"),
        Some(&Value::String("live_auction".to_string())),
    );
    let app = store
        .application(&ApplicationId("app-1".to_string()))
        .expect("application present");
    assert_eq!(app.auction_end_time, Some(clock.now() + Duration::hours(48)));
}

#[tokio::test]
async fn urgent_endpoint_lists_auctions_inside_the_horizon() {
    let (router, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-soon", clock.now(), Duration::hours(1)));
    store.seed_application(ApplicationSeed::open("app-later", clock.now(), Duration::hours(40)));

    let (status, payload) = get_json(&router, "/api/v1/applications/urgent").await;

    assert_eq!(status, StatusCode::OK);
    let applications = payload
        .get("applications")
        .and_then(Value::as_array)
        .expect("applications array");
    assert_eq!(applications.len(), 1);
    assert_eq!(
        applications[0].get("application_id"),
        Some(&Value::String("app-soon".to_string())),
    );
    assert_eq!(
        applications[0].get("minutes_remaining").and_then(Value::as_i64),
        Some(60),
    );
}

#[tokio::test]
async fn manual_check_runs_the_requested_cycles() {
    let (router, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(1)));
    clock.advance(Duration::hours(2));

    let (status, payload) = post_json(
        &router,
        "/api/v1/monitoring/check",
        serde_json::json!({ "kind": "all" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("kind"), Some(&Value::String("all".to_string())));
    let cycle = payload.get("status").expect("status cycle summary");
    assert_eq!(cycle.get("transitioned").and_then(Value::as_u64), Some(1));
    assert!(payload.get("revenue").is_some());
    assert!(payload.get("sweep").is_some());
    let health = payload.get("health").expect("health report");
    assert_eq!(health.get("store_reachable"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn monitoring_stats_expose_status_counts_and_heartbeats() {
    let (router, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    store.seed_application(ApplicationSeed::open("app-2", clock.now(), Duration::hours(48)));

    post_json(
        &router,
        "/api/v1/monitoring/check",
        serde_json::json!({ "kind": "status_transitions" }),
    )
    .await;

    let (status, payload) = get_json(&router, "/api/v1/monitoring/stats").await;

    assert_eq!(status, StatusCode::OK);
    let statuses = payload
        .get("statuses")
        .and_then(Value::as_array)
        .expect("statuses array");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].get("count").and_then(Value::as_u64), Some(2));
    let tasks = payload
        .get("tasks")
        .and_then(Value::as_array)
        .expect("tasks array");
    assert!(tasks.iter().any(|task| {
        task.get("task") == Some(&Value::String("status_monitor".to_string()))
            && !task.get("last_cycle").expect("field present").is_null()
    }));
}

#[tokio::test]
async fn revenue_endpoints_return_stats_and_daily_series() {
    let (router, _, _) = harness();

    let (status, payload) = get_json(&router, "/api/v1/revenue/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("total_entries").and_then(Value::as_u64), Some(0));

    let (status, payload) = get_json(&router, "/api/v1/revenue/trends").await;
    assert_eq!(status, StatusCode::OK);
    let days = payload.get("days").and_then(Value::as_array).expect("days array");
    assert_eq!(days.len(), 30);
}

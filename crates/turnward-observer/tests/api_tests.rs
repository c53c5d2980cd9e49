//! Integration tests for the admin API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use turnward_core::arbiter::{WorldWriter, arbiter};
use turnward_core::clock::ClockGauge;
use turnward_core::config::{LiveConfig, ServerConfig};
use turnward_core::operator::OperatorState;
use turnward_core::roster::{ActorProfile, ActorRecord};
use turnward_core::suppression::InputGates;
use turnward_core::world::World;
use turnward_observer::router::build_router;
use turnward_observer::state::AppState;
use turnward_types::{ConnectionId, RoomId, UserId};

struct Fixture {
    state: Arc<AppState>,
    // Held so the snapshot channel stays open.
    _writer: WorldWriter,
}

fn actor(id: u64, name: &str, zombie_since: Option<u64>) -> ActorRecord {
    ActorRecord {
        profile: ActorProfile::new(UserId(id), name, ConnectionId(id.saturating_add(100))),
        room_id: RoomId(3),
        zombie_since,
        last_input_round: 2,
    }
}

async fn make_test_state() -> Fixture {
    let live = LiveConfig::new(ServerConfig::default());
    let mut world = World::new(live.current(), InputGates::new());
    world.roster.insert(actor(1, "Ana", None));
    world.roster.insert(actor(2, "Bo", Some(4)));
    world.roster.refresh_stats();
    world.block_input(UserId(1));
    world.bad_input.record("xyzzy");
    world.bad_input.record("xyzzy");
    world.bad_input.record("plugh");

    let (writer, reader) = arbiter(world);
    writer.publish().await;

    let state = Arc::new(AppState::new(
        reader,
        ClockGauge::new(),
        Arc::new(OperatorState::new()),
        live,
    ));
    Fixture {
        state,
        _writer: writer,
    }
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post(state: &Arc<AppState>, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::post(uri).body(Body::empty()).unwrap(),
    };
    let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_index_returns_html() {
    let fixture = make_test_state().await;
    let router = build_router(Arc::clone(&fixture.state));

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_status_reports_snapshot_and_operator() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["snapshot"]["online"], 2);
    assert_eq!(json["snapshot"]["zombies"], 1);
    assert_eq!(json["operator"]["paused"], false);
    assert_eq!(json["operator"]["turn_ms"], 100);
}

#[tokio::test]
async fn test_clock() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/clock").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["turn"], 0);
    assert_eq!(json["turns_per_round"], 40);
}

#[tokio::test]
async fn test_list_actors() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/actors").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["actors"][0]["name"], "Ana");
    assert_eq!(json["actors"][0]["suppressed_since"], 0);
    assert_eq!(json["actors"][1]["zombie"], true);
}

#[tokio::test]
async fn test_list_actors_filter_zombie() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/actors?status=zombie").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["actors"][0]["name"], "Bo");
}

#[tokio::test]
async fn test_list_actors_bad_filter() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/actors?status=sleeping").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_get_actor() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/actors/2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Bo");
    assert_eq!(json["room_id"], 3);
    assert_eq!(json["connection_id"], 102);
}

#[tokio::test]
async fn test_get_actor_not_found() {
    let fixture = make_test_state().await;
    let (status, _) = get(&fixture.state, "/api/actors/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_actor_invalid_id() {
    let fixture = make_test_state().await;
    let (status, _) = get(&fixture.state, "/api/actors/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_input_ranking() {
    let fixture = make_test_state().await;
    let (status, json) = get(&fixture.state, "/api/bad-input?limit=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["verbs"].as_array().unwrap().len(), 1);
    assert_eq!(json["verbs"][0]["verb"], "xyzzy");
    assert_eq!(json["verbs"][0]["count"], 2);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let fixture = make_test_state().await;

    let (status, json) = post(&fixture.state, "/api/operator/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert!(fixture.state.operator.is_paused());

    let (status, _) = post(&fixture.state, "/api/operator/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!fixture.state.operator.is_paused());
}

#[tokio::test]
async fn test_stop() {
    let fixture = make_test_state().await;
    let (status, _) = post(&fixture.state, "/api/operator/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(fixture.state.operator.is_stop_requested());
}

#[tokio::test]
async fn test_set_timing() {
    let fixture = make_test_state().await;
    let (status, json) = post(
        &fixture.state,
        "/api/operator/timing",
        Some(serde_json::json!({ "turn_ms": 200 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["previous_turn_ms"], 100);
    assert_eq!(json["turn_ms"], 200);
    assert_eq!(json["turns_per_round"], 20);
    assert_eq!(fixture.state.live.current().timing.turn_ms, 200);
}

#[tokio::test]
async fn test_set_timing_rejects_tiny_period() {
    let fixture = make_test_state().await;
    let (status, _) = post(
        &fixture.state,
        "/api/operator/timing",
        Some(serde_json::json!({ "turn_ms": 5 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fixture.state.live.current().timing.turn_ms, 100);
}

#[tokio::test]
async fn test_broadcast_is_queued() {
    let fixture = make_test_state().await;
    let (status, _) = post(
        &fixture.state,
        "/api/operator/broadcast",
        Some(serde_json::json!({ "text": "  reboot in 5  " })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let queued = fixture.state.operator.drain_broadcasts().await;
    assert_eq!(queued, vec!["reboot in 5".to_owned()]);
}

#[tokio::test]
async fn test_broadcast_rejects_blank_text() {
    let fixture = make_test_state().await;
    let (status, _) = post(
        &fixture.state,
        "/api/operator/broadcast",
        Some(serde_json::json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

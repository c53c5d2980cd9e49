//! Operator REST API handlers for runtime scheduler control.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Snapshot plus scheduler status |
//! | `POST` | `/api/operator/pause` | Pause turn processing |
//! | `POST` | `/api/operator/resume` | Resume turn processing |
//! | `POST` | `/api/operator/stop` | Trigger clean shutdown |
//! | `POST` | `/api/operator/timing` | Set the turn period (ms) |
//! | `POST` | `/api/operator/broadcast` | Queue a server-wide message |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use turnward_core::config::MIN_TURN_MS;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/operator/timing`.
#[derive(Debug, serde::Deserialize)]
pub struct SetTimingRequest {
    /// New turn period in milliseconds.
    pub turn_ms: u64,
}

/// Request body for `POST /api/operator/broadcast`.
#[derive(Debug, serde::Deserialize)]
pub struct BroadcastRequest {
    /// Message shown to every connected client.
    pub text: String,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
}

fn ok(message: impl Into<String>) -> Json<OperatorResponse> {
    Json(OperatorResponse {
        ok: true,
        message: message.into(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the last published snapshot together with the operator status.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.reader.snapshot();
    let config = state.live.current();
    let operator = state.operator.status(
        state.gauge.turn(),
        state.gauge.round(),
        config.timing.turn_ms,
    );
    Json(serde_json::json!({
        "operator": operator,
        "snapshot": &*snapshot,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/operator/pause
// ---------------------------------------------------------------------------

/// Pause turn processing. Lifecycle signals are still served.
pub async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.pause();
    ok("Turn processing paused")
}

// ---------------------------------------------------------------------------
// POST /api/operator/resume
// ---------------------------------------------------------------------------

/// Resume turn processing after a pause.
pub async fn resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.resume();
    ok("Turn processing resumed")
}

// ---------------------------------------------------------------------------
// POST /api/operator/stop
// ---------------------------------------------------------------------------

/// Trigger a clean scheduler shutdown.
///
/// The scheduler finishes the branch it is running, drains notices, saves
/// every online actor and exits.
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.operator.request_stop();
    ok("Stop requested -- scheduler will exit after the current branch")
}

// ---------------------------------------------------------------------------
// POST /api/operator/timing
// ---------------------------------------------------------------------------

/// Change the turn period at runtime.
///
/// The new period applies from the turn after next.
pub async fn set_timing(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetTimingRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    if body.turn_ms < MIN_TURN_MS {
        return Err(ObserverError::InvalidRequest(format!(
            "turn_ms must be at least {MIN_TURN_MS}"
        )));
    }
    let previous = state.live.current().timing.turn_ms;
    let effective = state.live.set_turn_ms(body.turn_ms);
    let turns_per_round = state.live.current().turns_per_round();

    Ok(Json(serde_json::json!({
        "ok": true,
        "message": format!("Turn period changed from {previous}ms to {effective}ms"),
        "previous_turn_ms": previous,
        "turn_ms": effective,
        "turns_per_round": turns_per_round,
    })))
}

// ---------------------------------------------------------------------------
// POST /api/operator/broadcast
// ---------------------------------------------------------------------------

/// Queue a message for every connected client on the next notice drain.
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BroadcastRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(ObserverError::InvalidRequest(
            "broadcast text must not be empty".to_owned(),
        ));
    }
    state.operator.queue_broadcast(text.to_owned()).await;
    tracing::info!(len = text.len(), "operator broadcast queued");
    Ok(ok("Broadcast queued"))
}

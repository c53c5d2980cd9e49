//! Read-only REST handlers for the admin server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/clock` | Turn and round from the clock gauge |
//! | `GET` | `/api/actors` | Online actors (world lock) |
//! | `GET` | `/api/actors/{id}` | Single actor (world lock) |
//! | `GET` | `/api/bad-input` | Unrecognized verb counts (world lock) |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use turnward_types::UserId;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/actors` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct ActorsQuery {
    /// Filter by connection state. Accepted values: `live`, `zombie`, `all`.
    pub status: Option<String>,
}

/// Query parameters for the `GET /api/bad-input` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct BadInputQuery {
    /// Maximum number of verbs to return (default 20).
    pub limit: Option<usize>,
}

const DEFAULT_BAD_INPUT_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.reader.snapshot();
    let turn = snapshot.turn;
    let round = snapshot.round;
    let online = snapshot.online;
    let zombies = snapshot.zombies;
    let peak = snapshot.peak_online;
    let backlog = snapshot.backlog_len;
    let run_state = if state.operator.is_paused() {
        "PAUSED"
    } else {
        "RUNNING"
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Turnward Admin</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
    </style>
</head>
<body>
    <h1>Turnward Admin</h1>

    <p>Scheduler: <span class="status">{run_state}</span></p>

    <div>
        <div class="metric"><div class="label">Turn</div><div class="value">{turn}</div></div>
        <div class="metric"><div class="label">Round</div><div class="value">{round}</div></div>
        <div class="metric"><div class="label">Online</div><div class="value">{online}</div></div>
        <div class="metric"><div class="label">Zombies</div><div class="value">{zombies}</div></div>
        <div class="metric"><div class="label">Peak</div><div class="value">{peak}</div></div>
        <div class="metric"><div class="label">Backlog</div><div class="value">{backlog}</div></div>
    </div>

    <h2>API Endpoints</h2>
    <ul>
        <li><a href="/api/status">/api/status</a> -- Snapshot and scheduler status</li>
        <li><a href="/api/clock">/api/clock</a> -- Turn and round</li>
        <li><a href="/api/actors">/api/actors</a> -- Online actors</li>
        <li><a href="/api/bad-input">/api/bad-input</a> -- Unrecognized commands</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/clock
// ---------------------------------------------------------------------------

/// Return the current turn and round without touching the world lock.
pub async fn clock(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.live.current();
    Json(serde_json::json!({
        "turn": state.gauge.turn(),
        "round": state.gauge.round(),
        "turn_ms": config.timing.turn_ms,
        "turns_per_round": config.turns_per_round(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/actors
// ---------------------------------------------------------------------------

/// List online actors, optionally filtered by zombie state.
///
/// # Query Parameters
///
/// - `status`: `live` | `zombie` | `all` (default: `all`)
pub async fn list_actors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActorsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let filter = params.status.as_deref().unwrap_or("all");
    let want_zombie = match filter {
        "all" => None,
        "live" => Some(false),
        "zombie" => Some(true),
        other => {
            return Err(ObserverError::InvalidRequest(format!(
                "unknown status filter '{other}', expected live, zombie or all"
            )));
        }
    };

    let mut actors = state.reader.read(|w| w.actor_summaries()).await;
    if let Some(zombie) = want_zombie {
        actors.retain(|a| a.zombie == zombie);
    }

    Ok(Json(serde_json::json!({
        "count": actors.len(),
        "actors": actors,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/actors/{id}
// ---------------------------------------------------------------------------

/// Return one online actor.
pub async fn get_actor(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let user = parse_user_id(&id_str)?;
    let actor = state
        .reader
        .read(|w| w.actor_summary(user))
        .await
        .ok_or_else(|| ObserverError::NotFound(format!("actor {user}")))?;
    Ok(Json(actor))
}

// ---------------------------------------------------------------------------
// GET /api/bad-input
// ---------------------------------------------------------------------------

/// Return the most frequent unrecognized verbs.
pub async fn bad_input(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BadInputQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_BAD_INPUT_LIMIT);
    let (total, top) = state
        .reader
        .read(|w| (w.bad_input.total(), w.bad_input.top(limit)))
        .await;
    let verbs: Vec<serde_json::Value> = top
        .into_iter()
        .map(|(verb, count)| serde_json::json!({ "verb": verb, "count": count }))
        .collect();
    Json(serde_json::json!({
        "total": total,
        "verbs": verbs,
    }))
}

fn parse_user_id(s: &str) -> Result<UserId, ObserverError> {
    s.parse::<u64>()
        .map(UserId)
        .map_err(|e| ObserverError::InvalidId(format!("'{s}' is not a user id: {e}")))
}

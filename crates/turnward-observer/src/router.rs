//! Axum router construction for the admin API.
//!
//! Assembles all routes into a single [`Router`] with CORS and request
//! tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;

/// Build the complete Axum router for the admin server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /api/status` -- snapshot plus operator status
/// - `GET /api/clock` -- turn and round
/// - `GET /api/actors` -- online actors
/// - `GET /api/actors/{id}` -- single actor
/// - `GET /api/bad-input` -- unrecognized verb counts
/// - `POST /api/operator/{pause,resume,stop,timing,broadcast}`
///
/// CORS allows any origin; the server is meant to bind to an internal
/// interface.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // Read API
        .route("/api/status", get(operator::status))
        .route("/api/clock", get(handlers::clock))
        .route("/api/actors", get(handlers::list_actors))
        .route("/api/actors/{id}", get(handlers::get_actor))
        .route("/api/bad-input", get(handlers::bad_input))
        // Operator controls
        .route("/api/operator/pause", post(operator::pause))
        .route("/api/operator/resume", post(operator::resume))
        .route("/api/operator/stop", post(operator::stop))
        .route("/api/operator/timing", post(operator::set_timing))
        .route("/api/operator/broadcast", post(operator::broadcast))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Admin server startup helper for embedding in the engine.
//!
//! Provides [`spawn_observer`] which launches the admin HTTP server on a
//! background Tokio task so it runs alongside the scheduler.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the admin server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the admin HTTP server on a background Tokio task.
///
/// The address is validated before the task is spawned so obvious
/// misconfigurations surface at startup. The server stops when
/// `shutdown` resolves.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address does not
/// parse.
pub fn spawn_observer(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = config.socket_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&config, state, shutdown).await {
            tracing::error!(error = %e, "Admin server exited with error");
        }
    });

    tracing::info!(%addr, "Admin server spawned on background task");

    Ok(handle)
}

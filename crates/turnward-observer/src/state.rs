//! Shared application state for the admin API server.
//!
//! [`AppState`] bundles the handles the admin surface reads from. Aggregate
//! figures come from the published snapshot and the lock-free clock gauge,
//! so the common endpoints never contend with the scheduler. Roster and
//! bad-input queries take the world lock through a [`WorldReader`] and wait
//! behind whatever branch the scheduler is running.

use std::sync::Arc;

use turnward_core::arbiter::WorldReader;
use turnward_core::clock::ClockGauge;
use turnward_core::config::LiveConfig;
use turnward_core::operator::OperatorState;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Locked and snapshot access to the world.
    pub reader: WorldReader,
    /// Turn and round counters.
    pub gauge: ClockGauge,
    /// Pause, resume, stop and broadcast controls.
    pub operator: Arc<OperatorState>,
    /// Hot-reloadable configuration.
    pub live: LiveConfig,
}

impl AppState {
    /// Bundle the scheduler handles for the router.
    pub const fn new(
        reader: WorldReader,
        gauge: ClockGauge,
        operator: Arc<OperatorState>,
        live: LiveConfig,
    ) -> Self {
        Self {
            reader,
            gauge,
            operator,
            live,
        }
    }
}

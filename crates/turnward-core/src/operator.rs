//! Operator control state for runtime scheduler management.
//!
//! This module provides shared atomic state used by the scheduler loop and
//! the operator REST API. The operator can pause/resume turn processing,
//! queue server-wide broadcasts, and trigger a clean shutdown -- all without
//! stopping the process. The turn period itself lives in
//! [`LiveConfig`](crate::config::LiveConfig).
//!
//! # Architecture
//!
//! All mutable control fields use [`std::sync::atomic`] types so they can
//! be shared between the scheduler task and the Axum handler tasks without
//! locks on the hot path. Tick timing statistics are recorded here by the
//! scheduler after every turn.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

/// Shared operator control state.
///
/// Wrapped in [`Arc`](std::sync::Arc) and shared between the scheduler and
/// operator API handlers.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether turn processing is currently paused.
    paused: AtomicBool,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes every task waiting in [`OperatorState::stopped`].
    stop_notify: Notify,

    /// Wall-clock time when the scheduler started.
    started_at: DateTime<Utc>,

    /// Per-turn processing durations.
    timings: TickTimings,

    /// Operator broadcasts awaiting delivery on the next drain.
    broadcasts: Mutex<Vec<String>>,
}

impl Default for OperatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorState {
    /// Create a running (not paused, not stopping) operator state.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            started_at: Utc::now(),
            timings: TickTimings::default(),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether turn processing is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause turn processing. Lifecycle signals are still served.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        tracing::info!("operator paused turn processing");
    }

    /// Resume turn processing.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        tracing::info!("operator resumed turn processing");
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean scheduler stop.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    ///
    /// Any number of tasks may wait at once; all of them wake.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent stop is not missed.
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Broadcasts
    // -----------------------------------------------------------------------

    /// Queue a message for every connected client.
    pub async fn queue_broadcast(&self, text: String) {
        self.broadcasts.lock().await.push(text);
    }

    /// Take every queued broadcast.
    pub async fn drain_broadcasts(&self) -> Vec<String> {
        std::mem::take(&mut *self.broadcasts.lock().await)
    }

    // -----------------------------------------------------------------------
    // Timing
    // -----------------------------------------------------------------------

    /// Record how long one turn took to process.
    pub fn record_tick(&self, elapsed: Duration) {
        self.timings.record(elapsed);
    }

    /// Current tick timing summary.
    pub fn tick_timing(&self) -> TickTimingSummary {
        self.timings.summary()
    }

    /// Return the wall-clock start time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Return elapsed seconds since start.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }

    /// Build a status report for the operator API.
    pub fn status(&self, turn: u64, round: u64, turn_ms: u64) -> OperatorStatus {
        OperatorStatus {
            turn,
            round,
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            turn_ms,
            elapsed_seconds: self.elapsed_seconds(),
            started_at: self.started_at.to_rfc3339(),
            tick_timing: self.tick_timing(),
        }
    }
}

#[derive(Debug, Default)]
struct TickTimings {
    count: AtomicU64,
    last_us: AtomicU64,
    max_us: AtomicU64,
    total_us: AtomicU64,
}

impl TickTimings {
    fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_us.store(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
        // The update closure always returns `Some`, so this cannot fail.
        if let Err(total) = self
            .total_us
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| {
                Some(t.saturating_add(us))
            })
        {
            tracing::warn!(total, "tick total not updated");
        }
    }

    fn summary(&self) -> TickTimingSummary {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_us.load(Ordering::Relaxed);
        TickTimingSummary {
            count,
            last_us: self.last_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
            mean_us: total.checked_div(count).unwrap_or(0),
        }
    }
}

/// Turn processing durations in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickTimingSummary {
    /// Turns processed.
    pub count: u64,
    /// Duration of the most recent turn.
    pub last_us: u64,
    /// Longest turn observed.
    pub max_us: u64,
    /// Mean turn duration.
    pub mean_us: u64,
}

/// JSON-serializable scheduler status for the operator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorStatus {
    /// Current turn.
    pub turn: u64,
    /// Current round.
    pub round: u64,
    /// Whether turn processing is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Current turn period in milliseconds.
    pub turn_ms: u64,
    /// Elapsed wall-clock seconds since start.
    pub elapsed_seconds: u64,
    /// ISO 8601 timestamp of when the scheduler started.
    pub started_at: String,
    /// Turn processing durations.
    pub tick_timing: TickTimingSummary,
}

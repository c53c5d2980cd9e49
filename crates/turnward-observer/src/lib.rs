//! Admin API server for the Turnward scheduler.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Read endpoints** for the clock, online actors, and unrecognized
//!   command counts
//! - **Operator endpoints** for runtime control (pause, resume, stop,
//!   turn period, broadcast)
//! - **Minimal HTML page** (`GET /`) showing turn, round, and population
//!
//! # Architecture
//!
//! Aggregate reads are served from the snapshot the scheduler publishes
//! after every branch, and from the lock-free clock gauge. Roster queries
//! take the world lock through a [`WorldReader`], so they observe a
//! consistent state between scheduler branches.
//!
//! [`WorldReader`]: turnward_core::arbiter::WorldReader

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;

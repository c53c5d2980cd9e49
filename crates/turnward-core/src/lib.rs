//! Turn clock, admission scheduler, and world lifecycle for the Turnward
//! server.
//!
//! One task owns all simulation state and advances it on a fixed-period
//! turn. Everything else talks to that task through queues or through the
//! world lock.
//!
//! # Modules
//!
//! - [`clock`] -- Turn and round counters, plus the lock-free [`ClockGauge`].
//! - [`config`] -- Configuration loading from `turnward-config.yaml` and the
//!   hot-reloadable [`LiveConfig`].
//! - [`admission`] -- The per-turn admission pass over the event backlog.
//! - [`suppression`] -- Per-actor input gates for blocking actions.
//! - [`dispatch`] -- The command interpreter contract and fault isolation.
//! - [`listener`] -- Veto listeners keyed by event kind.
//! - [`macros`] -- Two-character input macros.
//! - [`services`] -- Collaborator traits for rooms, sessions, and storage.
//! - [`roster`] -- Online actors and aggregate statistics.
//! - [`lifecycle`] -- Enter, leave, logout, zombie, and idle handling.
//! - [`world`] -- The scheduler-owned [`World`](world::World) context.
//! - [`arbiter`] -- The world lock and snapshot publication.
//! - [`ingest`] -- Raw input submission and the ingestion worker.
//! - [`operator`] -- Pause, resume, stop, and broadcast controls.
//! - [`runner`] -- The multiplexed [`Scheduler`](runner::Scheduler) loop.
//!
//! [`ClockGauge`]: clock::ClockGauge
//! [`LiveConfig`]: config::LiveConfig

pub mod admission;
pub mod arbiter;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod ingest;
pub mod lifecycle;
pub mod listener;
pub mod macros;
pub mod operator;
pub mod roster;
pub mod runner;
pub mod services;
pub mod suppression;
pub mod world;

#[cfg(test)]
mod testkit;

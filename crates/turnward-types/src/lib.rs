//! Shared type definitions for the Turnward world scheduler.
//!
//! Types defined here are used by every crate in the workspace. Identifier
//! and snapshot types also flow to `TypeScript` via `ts-rs` for the admin
//! dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for user, mob, connection, room and event ids
//! - [`event`] -- The scheduled [`Event`] record, its flags, and system notices
//! - [`snapshot`] -- The immutable [`WorldSnapshot`] published by the scheduler

pub mod event;
pub mod ids;
pub mod snapshot;

pub use event::{
    Event, EventFlag, EventFlags, EventKind, Notice, Originator, ReadyTurn, WorldEvent,
};
pub use ids::{ConnectionId, EventId, MobId, RoomId, UserId};
pub use snapshot::{ActorSummary, WorldSnapshot};

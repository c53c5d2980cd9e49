//! Immutable world snapshots published after every scheduler branch.
//!
//! Readers that only need a consistent, slightly stale view consult the
//! latest [`WorldSnapshot`] instead of contending for the world lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ConnectionId, RoomId, UserId};

/// Summary of one online actor as seen at publication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActorSummary {
    /// The actor's user id.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Connection currently bound to the actor.
    pub connection_id: ConnectionId,
    /// Room the actor occupies.
    pub room_id: RoomId,
    /// Whether the actor is soft-disconnected.
    pub zombie: bool,
    /// Round of the actor's last non-empty input.
    pub last_input_round: u64,
    /// Turn at which input suppression began, if suppressed.
    pub suppressed_since: Option<u64>,
}

/// Point-in-time view of the scheduler-owned world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldSnapshot {
    /// Current turn.
    pub turn: u64,
    /// Current round.
    pub round: u64,
    /// Cached turns per round at publication time.
    pub turns_per_round: u64,
    /// Actors currently in the world (zombies included).
    pub online: u64,
    /// Actors currently soft-disconnected.
    pub zombies: u64,
    /// Highest `online` value observed since startup.
    pub peak_online: u64,
    /// Enter-world transitions since startup.
    pub total_logins: u64,
    /// Events waiting in the backlog.
    pub backlog_len: u64,
    /// Notices waiting for the miscellaneous drain.
    pub pending_notices: u64,
    /// Online actors ordered by user id.
    pub actors: Vec<ActorSummary>,
    /// Wall-clock publication time.
    pub published_at: DateTime<Utc>,
}

impl WorldSnapshot {
    /// An empty snapshot for a world that has not ticked yet.
    pub fn empty(turns_per_round: u64) -> Self {
        Self {
            turn: 0,
            round: 0,
            turns_per_round,
            online: 0,
            zombies: 0,
            peak_online: 0,
            total_logins: 0,
            backlog_len: 0,
            pending_notices: 0,
            actors: Vec::new(),
            published_at: Utc::now(),
        }
    }

    /// Look up an actor summary by user id.
    pub fn actor(&self, user_id: UserId) -> Option<&ActorSummary> {
        self.actors.iter().find(|a| a.user_id == user_id)
    }
}

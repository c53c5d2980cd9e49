//! The scheduler-owned world context.
//!
//! [`World`] gathers every piece of shared simulation state: the clock, the
//! suppression table, the roster, the event backlog and notice queue. It is
//! constructed once, handed to the [`arbiter`](crate::arbiter), and from
//! then on mutated only by the scheduler task.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use turnward_types::{ActorSummary, Event, Notice, UserId, WorldSnapshot};

use crate::admission::Backlog;
use crate::clock::TurnClock;
use crate::config::ServerConfig;
use crate::dispatch::BadInputTracker;
use crate::roster::Roster;
use crate::suppression::{GateChange, InputGate, InputGates, SuppressionTable};

/// All scheduler-owned state.
#[derive(Debug)]
pub struct World {
    /// Turn and round counters.
    pub clock: TurnClock,
    /// Active input suppressions.
    pub suppression: SuppressionTable,
    /// Actors in the world.
    pub roster: Roster,
    /// Events awaiting admission.
    pub backlog: Backlog,
    /// Notices awaiting the miscellaneous drain.
    pub notices: VecDeque<Notice>,
    /// Unrecognized verb counts.
    pub bad_input: BadInputTracker,
    /// Configuration in effect for the current turn.
    pub config: Arc<ServerConfig>,
    gates: InputGates,
}

impl World {
    /// A fresh world at turn 0 that publishes gate changes to `gates`.
    pub fn new(config: Arc<ServerConfig>, gates: InputGates) -> Self {
        Self {
            clock: TurnClock::new(),
            suppression: SuppressionTable::new(),
            roster: Roster::new(),
            backlog: Backlog::new(),
            notices: VecDeque::new(),
            bad_input: BadInputTracker::new(),
            config,
            gates,
        }
    }

    /// Queue an event for admission on the next pass.
    pub fn enqueue(&mut self, event: Event) {
        self.backlog.push(event);
    }

    /// Queue a notice for the miscellaneous drain.
    pub fn notify(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    /// Suspend input for `user` from the current turn.
    pub fn block_input(&mut self, user: UserId) -> GateChange {
        let change = self.suppression.block(user, self.clock.turn());
        if change == GateChange::Changed {
            self.gates.set(user, true);
        }
        change
    }

    /// Resume input for `user`.
    pub fn release_input(&mut self, user: UserId) -> GateChange {
        let change = self.suppression.release(user);
        if change == GateChange::Changed {
            self.gates.set(user, false);
        }
        change
    }

    /// Current gate for `user`.
    pub fn gate(&self, user: UserId) -> InputGate {
        self.suppression.gate(user)
    }

    /// Summary of one online actor.
    pub fn actor_summary(&self, user: UserId) -> Option<ActorSummary> {
        self.roster.get(user).map(|a| a.summary(self.suppressed_since(user)))
    }

    /// Summaries of every online actor in user-id order.
    pub fn actor_summaries(&self) -> Vec<ActorSummary> {
        self.roster
            .iter()
            .map(|a| a.summary(self.suppressed_since(a.profile.user_id)))
            .collect()
    }

    fn suppressed_since(&self, user: UserId) -> Option<u64> {
        match self.suppression.gate(user) {
            InputGate::Free => None,
            InputGate::AwaitingCompletion { since_turn } => Some(since_turn),
        }
    }

    /// Build an immutable snapshot of the current state.
    pub fn snapshot(&self) -> WorldSnapshot {
        let stats = self.roster.stats();
        let actors = self.actor_summaries();
        WorldSnapshot {
            turn: self.clock.turn(),
            round: self.clock.round(),
            turns_per_round: self.config.turns_per_round(),
            online: stats.online,
            zombies: stats.zombies,
            peak_online: stats.peak_online,
            total_logins: stats.total_logins,
            backlog_len: u64::try_from(self.backlog.len()).unwrap_or(u64::MAX),
            pending_notices: u64::try_from(self.notices.len()).unwrap_or(u64::MAX),
            actors,
            published_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use turnward_types::{ConnectionId, RoomId};

    use super::*;
    use crate::roster::{ActorProfile, ActorRecord};

    #[test]
    fn gate_changes_are_published() {
        let gates = InputGates::new();
        let mut world = World::new(Arc::new(ServerConfig::default()), gates.clone());
        let user = UserId(1);

        assert_eq!(world.block_input(user), GateChange::Changed);
        assert!(gates.is_blocked(user));
        assert_eq!(world.block_input(user), GateChange::Unchanged);

        assert_eq!(world.release_input(user), GateChange::Changed);
        assert!(!gates.is_blocked(user));
    }

    #[test]
    fn snapshot_reports_suppression() {
        let mut world = World::new(Arc::new(ServerConfig::default()), InputGates::new());
        world.roster.insert(ActorRecord {
            profile: ActorProfile::new(UserId(1), "ana", ConnectionId(5)),
            room_id: RoomId(3),
            zombie_since: None,
            last_input_round: 0,
        });
        world.roster.refresh_stats();
        world.block_input(UserId(1));

        let snap = world.snapshot();
        assert_eq!(snap.online, 1);
        assert_eq!(snap.turns_per_round, 40);
        let actor = snap.actor(UserId(1));
        assert_eq!(actor.map(|a| a.suppressed_since), Some(Some(0)));
    }
}

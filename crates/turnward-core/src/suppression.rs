//! Per-actor input gates for multi-turn actions.
//!
//! A gate moves `Free -> AwaitingCompletion` when the scheduler sees a
//! Block-flagged event it cannot run yet, and back to `Free` when an
//! Unblock-flagged event for the same actor is admitted. The scheduler owns
//! the [`SuppressionTable`]; the connection layer sees only the published
//! [`InputGates`] set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use turnward_types::UserId;

/// Input acceptance state for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputGate {
    /// New input is accepted.
    Free,
    /// Input is suspended until a completion event runs.
    AwaitingCompletion {
        /// Turn at which the suspension began.
        since_turn: u64,
    },
}

/// Result of a gate transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChange {
    /// The gate changed state.
    Changed,
    /// The gate was already in the requested state.
    Unchanged,
}

/// Scheduler-owned map from actor to active suppression.
///
/// An actor has at most one entry; absence means [`InputGate::Free`].
#[derive(Debug, Clone, Default)]
pub struct SuppressionTable {
    entries: BTreeMap<UserId, u64>,
}

impl SuppressionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gate for `user`.
    pub fn gate(&self, user: UserId) -> InputGate {
        self.entries
            .get(&user)
            .map_or(InputGate::Free, |&since_turn| {
                InputGate::AwaitingCompletion { since_turn }
            })
    }

    /// Suspend input for `user` starting at `turn`. An existing suspension
    /// keeps its original start turn.
    pub fn block(&mut self, user: UserId, turn: u64) -> GateChange {
        if self.entries.contains_key(&user) {
            return GateChange::Unchanged;
        }
        self.entries.insert(user, turn);
        GateChange::Changed
    }

    /// Resume input for `user`.
    pub fn release(&mut self, user: UserId) -> GateChange {
        if self.entries.remove(&user).is_some() {
            GateChange::Changed
        } else {
            GateChange::Unchanged
        }
    }

    /// Number of suppressed actors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no actor is suppressed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(user, since_turn)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (UserId, u64)> + '_ {
        self.entries.iter().map(|(&u, &t)| (u, t))
    }
}

/// Read-mostly set of suppressed actors shared with the connection layer.
///
/// Written by the scheduler on every gate change, read by
/// [`IngestHandle::submit`](crate::ingest::IngestHandle::submit).
#[derive(Debug, Clone, Default)]
pub struct InputGates {
    blocked: Arc<RwLock<BTreeSet<UserId>>>,
}

impl InputGates {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether raw input for `user` is currently refused.
    pub fn is_blocked(&self, user: UserId) -> bool {
        self.blocked
            .read()
            .is_ok_and(|set| set.contains(&user))
    }

    pub(crate) fn set(&self, user: UserId, blocked: bool) {
        let Ok(mut set) = self.blocked.write() else {
            tracing::error!(%user, "input gate set poisoned");
            return;
        };
        if blocked {
            set.insert(user);
        } else {
            set.remove(&user);
        }
    }
}

//! Turn and round counters for the world clock.
//!
//! The clock is the single source of truth for scheduler time. It is owned
//! by the [`World`](crate::world::World) and mutated only by the scheduler
//! task. Every `turns_per_round` turns the round counter advances; the
//! divisor is passed in on each advance so that a hot configuration change
//! takes effect on the next turn without resetting either counter.
//!
//! # Design Principles
//!
//! - All counter arithmetic is checked (no silent overflow).
//! - The round counter only moves forward, by exactly one, on a turn that
//!   is a multiple of the current `turns_per_round`.
//! - Other tasks read the counters through a [`ClockGauge`], which is a pair
//!   of atomics and never blocks the writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClockError {
    /// Turn counter would overflow.
    #[error("turn counter overflow: cannot advance beyond u64::MAX")]
    TurnOverflow,

    /// Round counter would overflow.
    #[error("round counter overflow: cannot advance beyond u64::MAX")]
    RoundOverflow,

    /// A round must contain at least one turn.
    #[error("turns_per_round must be at least 1")]
    ZeroTurnsPerRound,
}

/// Outcome of advancing the clock by one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnAdvance {
    /// The turn that just began.
    pub turn: u64,
    /// The new round number if this turn crossed a round boundary.
    pub new_round: Option<u64>,
}

/// Turn and round counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnClock {
    /// Current turn (0 before the first tick).
    turn: u64,
    /// Current round.
    round: u64,
}

impl TurnClock {
    /// A clock at turn 0, round 0.
    pub const fn new() -> Self {
        Self { turn: 0, round: 0 }
    }

    /// Restore a clock from saved counters.
    pub const fn from_parts(turn: u64, round: u64) -> Self {
        Self { turn, round }
    }

    /// Advance by one turn. The round advances when the new turn is a
    /// multiple of `turns_per_round`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::ZeroTurnsPerRound`] if the divisor is zero, or an
    /// overflow error if either counter would exceed `u64::MAX`. The clock is
    /// left unchanged on error.
    pub fn advance(&mut self, turns_per_round: u64) -> Result<TurnAdvance, ClockError> {
        let turn = self.turn.checked_add(1).ok_or(ClockError::TurnOverflow)?;
        let boundary = turn
            .checked_rem(turns_per_round)
            .ok_or(ClockError::ZeroTurnsPerRound)?
            == 0;

        let new_round = if boundary {
            let round = self.round.checked_add(1).ok_or(ClockError::RoundOverflow)?;
            self.round = round;
            Some(round)
        } else {
            None
        };
        self.turn = turn;

        Ok(TurnAdvance { turn, new_round })
    }

    /// Return the current turn.
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Return the current round.
    pub const fn round(&self) -> u64 {
        self.round
    }
}

/// Lock-free, read-mostly view of the clock counters.
///
/// The scheduler publishes after each advance; the ingestion worker and the
/// admin surface read without touching the world lock.
#[derive(Debug, Clone, Default)]
pub struct ClockGauge {
    turn: Arc<AtomicU64>,
    round: Arc<AtomicU64>,
}

impl ClockGauge {
    /// A gauge reading zero for both counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the clock's current counters.
    pub fn publish(&self, clock: &TurnClock) {
        self.round.store(clock.round(), Ordering::Release);
        self.turn.store(clock.turn(), Ordering::Release);
    }

    /// Last published turn.
    pub fn turn(&self) -> u64 {
        self.turn.load(Ordering::Acquire)
    }

    /// Last published round.
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }
}

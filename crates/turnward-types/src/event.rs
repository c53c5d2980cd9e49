//! Scheduled events and system notices.
//!
//! An [`Event`] is one actor-originated action waiting for admission by the
//! scheduler. It is immutable once enqueued, except that the scheduler strips
//! a flag after applying that flag's side effect. A [`Notice`] is a
//! system-originated announcement (spawns, despawns, round boundaries) that
//! is drained on the fast miscellaneous timer. Both travel through listener
//! chains as a [`WorldEvent`].

use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, EventId, MobId, RoomId, UserId};

/// Who submitted an event. Users and mobs are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Originator {
    /// A connected player.
    User(UserId),
    /// A mob instance driven by scripts or AI.
    Mob(MobId),
}

impl Originator {
    /// Return the user id if a user originated the event.
    pub const fn user(self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Mob(_) => None,
        }
    }

    /// Return the mob id if a mob originated the event.
    pub const fn mob(self) -> Option<MobId> {
        match self {
            Self::Mob(id) => Some(id),
            Self::User(_) => None,
        }
    }
}

impl core::fmt::Display for Originator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Mob(id) => write!(f, "mob:{id}"),
        }
    }
}

/// Earliest turn at which an event may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyTurn {
    /// Fire on the next pass regardless of the turn. For users this does not
    /// count against the one-per-tick fairness budget.
    Immediate,
    /// Eligible once the clock reaches this turn.
    At(u64),
}

impl ReadyTurn {
    /// Whether an event with this readiness may run during `turn`.
    pub const fn is_ready(self, turn: u64) -> bool {
        match self {
            Self::Immediate => true,
            Self::At(ready) => ready <= turn,
        }
    }

    /// Whether this is the fairness-exempt immediate marker.
    pub const fn is_immediate(self) -> bool {
        matches!(self, Self::Immediate)
    }
}

/// A cooperative control flag carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFlag {
    /// Suspend acceptance of new input for the originator until an
    /// Unblock-flagged event dispatches.
    Block,
    /// Resume acceptance of input for the originator.
    Unblock,
    /// Downstream handlers should suppress room-visible output.
    Secret,
    /// Downstream handlers should not invoke entity scripts.
    SkipScripts,
}

impl EventFlag {
    /// Every flag, in bit order.
    pub const ALL: [Self; 4] = [Self::Block, Self::Unblock, Self::Secret, Self::SkipScripts];

    const fn bit(self) -> u8 {
        match self {
            Self::Block => 1,
            Self::Unblock => 1 << 1,
            Self::Secret => 1 << 2,
            Self::SkipScripts => 1 << 3,
        }
    }
}

/// A small set of [`EventFlag`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventFlags(u8);

impl EventFlags {
    /// Block input now and unblock it when the same event completes.
    pub const BLOCK_UNTIL_COMPLETE: Self = Self(EventFlag::Block.bit() | EventFlag::Unblock.bit());

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Return a copy of this set with `flag` added.
    #[must_use]
    pub const fn with(self, flag: EventFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    /// Add `flag` to the set.
    pub const fn insert(&mut self, flag: EventFlag) {
        self.0 |= flag.bit();
    }

    /// Remove `flag` from the set. Returns whether it was present.
    pub const fn remove(&mut self, flag: EventFlag) -> bool {
        let present = self.contains(flag);
        self.0 &= !flag.bit();
        present
    }

    /// Whether `flag` is in the set.
    pub const fn contains(self, flag: EventFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the flags in the set.
    pub fn iter(self) -> impl Iterator<Item = EventFlag> {
        EventFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<EventFlag> for EventFlags {
    fn from(flag: EventFlag) -> Self {
        Self::empty().with(flag)
    }
}

impl FromIterator<EventFlag> for EventFlags {
    fn from_iter<I: IntoIterator<Item = EventFlag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl Serialize for EventFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for EventFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flags = Vec::<EventFlag>::deserialize(deserializer)?;
        Ok(flags.into_iter().collect())
    }
}

/// One actor-originated action awaiting admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id, used to trace the event through admission.
    pub id: EventId,
    /// Who submitted it.
    pub originator: Originator,
    /// Raw command text.
    pub text: String,
    /// Earliest eligible turn.
    pub ready: ReadyTurn,
    /// Cooperative control flags.
    pub flags: EventFlags,
    /// Turn during which the event was created.
    pub created_turn: u64,
}

impl Event {
    /// Build an event created during `created_turn`.
    pub fn new(
        originator: Originator,
        text: impl Into<String>,
        ready: ReadyTurn,
        created_turn: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            originator,
            text: text.into(),
            ready,
            flags: EventFlags::empty(),
            created_turn,
        }
    }

    /// Return the event with `flags` replacing its current flags.
    #[must_use]
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A system-originated announcement drained by the miscellaneous timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// A user entered the world.
    PlayerSpawn {
        /// The user who entered.
        user_id: UserId,
        /// Room they were placed in.
        room_id: RoomId,
    },
    /// A user left the world.
    PlayerDespawn {
        /// The user who left.
        user_id: UserId,
        /// Room they were in.
        room_id: RoomId,
    },
    /// A round boundary was crossed.
    NewRound {
        /// The new round number.
        round: u64,
        /// The turn that completed the previous round.
        turn: u64,
    },
    /// Text for every connected client.
    Broadcast {
        /// The message body.
        text: String,
    },
    /// A connection was logged out.
    LoggedOut {
        /// The connection that was closed.
        connection_id: ConnectionId,
        /// The user, when one had authenticated.
        user_id: Option<UserId>,
    },
}

/// Anything a listener may inspect before it is handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WorldEvent {
    /// A command about to be dispatched.
    Input(Event),
    /// A notice about to be delivered.
    Notice(Notice),
}

/// Discriminant of a [`WorldEvent`], used to key listener chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`WorldEvent::Input`].
    Input,
    /// [`Notice::PlayerSpawn`].
    PlayerSpawn,
    /// [`Notice::PlayerDespawn`].
    PlayerDespawn,
    /// [`Notice::NewRound`].
    NewRound,
    /// [`Notice::Broadcast`].
    Broadcast,
    /// [`Notice::LoggedOut`].
    LoggedOut,
}

impl Notice {
    /// The listener key for this notice.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PlayerSpawn { .. } => EventKind::PlayerSpawn,
            Self::PlayerDespawn { .. } => EventKind::PlayerDespawn,
            Self::NewRound { .. } => EventKind::NewRound,
            Self::Broadcast { .. } => EventKind::Broadcast,
            Self::LoggedOut { .. } => EventKind::LoggedOut,
        }
    }
}

impl WorldEvent {
    /// The listener key for this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Input(_) => EventKind::Input,
            Self::Notice(notice) => notice.kind(),
        }
    }
}

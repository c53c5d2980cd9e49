//! Collaborator interfaces the scheduler drives.
//!
//! Room storage, the connection layer, notice delivery, persistence, and
//! periodic maintenance all live outside this crate. The scheduler reaches
//! them only through the traits here, always while holding the world lock,
//! so implementations must return promptly and must not block on the lock
//! themselves.
//!
//! Each trait ships with a null implementation that only logs, which the
//! engine binary uses until real subsystems are wired in.

use std::fmt;

use turnward_types::{ConnectionId, Notice, RoomId, UserId};

use crate::dispatch::{CommandInterpreter, NullInterpreter};
use crate::listener::ListenerRegistry;

/// Errors from the room collaborator.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    /// The requested room does not exist or could not be loaded.
    #[error("room {room_id} not found")]
    NotFound {
        /// The missing room.
        room_id: RoomId,
    },

    /// The room refused the actor.
    #[error("room {room_id} rejected user {user_id}: {reason}")]
    Rejected {
        /// The room.
        room_id: RoomId,
        /// The actor.
        user_id: UserId,
        /// Why.
        reason: String,
    },
}

/// Errors from the persistence collaborator.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Writing one user failed.
    #[error("failed to save user {user_id}: {reason}")]
    User {
        /// The user being saved.
        user_id: UserId,
        /// Backend explanation.
        reason: String,
    },

    /// The backing store is unavailable.
    #[error("persistence backend unavailable: {reason}")]
    Unavailable {
        /// Backend explanation.
        reason: String,
    },
}

/// Room placement.
pub trait RoomDirectory: Send {
    /// Put `user` into `room`.
    fn place(&mut self, user: UserId, room: RoomId) -> Result<(), RoomError>;

    /// Take `user` out of `room`.
    fn remove(&mut self, user: UserId, room: RoomId);
}

/// The connection-handling layer, seen from the scheduler.
pub trait SessionLink: Send {
    /// Stop forwarding raw input for `user`.
    fn block_input(&mut self, user: UserId);

    /// Resume forwarding raw input for `user`.
    fn resume_input(&mut self, user: UserId);

    /// Send a line of text to `user`.
    fn send_text(&mut self, user: UserId, text: &str);

    /// Close `connection` after a logout.
    fn logout_connection(&mut self, connection: ConnectionId);

    /// Forcibly disconnect `connection`.
    fn kick(&mut self, connection: ConnectionId, reason: &str);
}

/// Final destination of drained notices.
pub trait NoticeSink: Send {
    /// Deliver one notice.
    fn deliver(&mut self, notice: &Notice);
}

/// Best-effort persistence.
pub trait Persistence: Send {
    /// Save one user.
    fn save_user(&mut self, user: UserId) -> Result<(), PersistenceError>;

    /// Save everything. Returns the number of records written.
    fn save_all(&mut self, online: &[UserId]) -> Result<usize, PersistenceError>;
}

/// Slow periodic jobs run on their own timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaintenanceKind {
    /// Unload idle rooms and run room upkeep.
    RoomMaintenance,
    /// Reload text alias tables.
    AliasReload,
    /// Log server statistics.
    StatsLog,
}

impl fmt::Display for MaintenanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoomMaintenance => "room_maintenance",
            Self::AliasReload => "alias_reload",
            Self::StatsLog => "stats_log",
        };
        f.write_str(name)
    }
}

/// Periodic maintenance hook.
pub trait Maintenance: Send {
    /// Run one maintenance job.
    fn run(&mut self, kind: MaintenanceKind);
}

/// Everything the scheduler calls out to.
pub struct Services {
    /// Gameplay command interpreter for user input.
    pub interpreter: Box<dyn CommandInterpreter>,
    /// Command interpreter for mob input.
    pub mob_interpreter: Box<dyn CommandInterpreter>,
    /// Room placement.
    pub rooms: Box<dyn RoomDirectory>,
    /// Connection layer.
    pub sessions: Box<dyn SessionLink>,
    /// Notice delivery.
    pub notices: Box<dyn NoticeSink>,
    /// Persistence.
    pub persistence: Box<dyn Persistence>,
    /// Periodic maintenance.
    pub maintenance: Box<dyn Maintenance>,
    /// Veto chains consulted before dispatch and delivery.
    pub listeners: ListenerRegistry,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl Default for Services {
    fn default() -> Self {
        Self {
            interpreter: Box::new(NullInterpreter),
            mob_interpreter: Box::new(NullInterpreter),
            rooms: Box::new(NullRooms),
            sessions: Box::new(NullSessions),
            notices: Box::new(LogNotices),
            persistence: Box::new(NullPersistence),
            maintenance: Box::new(LogMaintenance),
            listeners: ListenerRegistry::new(),
        }
    }
}

/// Accepts every placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRooms;

impl RoomDirectory for NullRooms {
    fn place(&mut self, _user: UserId, _room: RoomId) -> Result<(), RoomError> {
        Ok(())
    }

    fn remove(&mut self, _user: UserId, _room: RoomId) {}
}

/// Logs session requests at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSessions;

impl SessionLink for NullSessions {
    fn block_input(&mut self, user: UserId) {
        tracing::debug!(%user, "block input");
    }

    fn resume_input(&mut self, user: UserId) {
        tracing::debug!(%user, "resume input");
    }

    fn send_text(&mut self, user: UserId, text: &str) {
        tracing::debug!(%user, text, "send text");
    }

    fn logout_connection(&mut self, connection: ConnectionId) {
        tracing::debug!(%connection, "logout connection");
    }

    fn kick(&mut self, connection: ConnectionId, reason: &str) {
        tracing::debug!(%connection, reason, "kick connection");
    }
}

/// Logs every delivered notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn deliver(&mut self, notice: &Notice) {
        tracing::debug!(?notice, "notice delivered");
    }
}

/// Persists nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersistence;

impl Persistence for NullPersistence {
    fn save_user(&mut self, _user: UserId) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn save_all(&mut self, online: &[UserId]) -> Result<usize, PersistenceError> {
        Ok(online.len())
    }
}

/// Logs each maintenance run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMaintenance;

impl Maintenance for LogMaintenance {
    fn run(&mut self, kind: MaintenanceKind) {
        tracing::debug!(%kind, "maintenance");
    }
}

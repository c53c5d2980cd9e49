//! Recording fakes for the collaborator traits, shared by the unit tests.

#![allow(clippy::unwrap_used, clippy::missing_const_for_fn)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use turnward_types::{ConnectionId, Notice, RoomId, UserId};

use crate::dispatch::{
    Command, CommandInterpreter, DispatchContext, DispatchError, DispatchOutcome,
};
use crate::listener::ListenerRegistry;
use crate::roster::{ActorProfile, ActorRecord};
use crate::services::{
    Maintenance, MaintenanceKind, NoticeSink, Persistence, PersistenceError, RoomDirectory,
    RoomError, Services, SessionLink,
};
use crate::world::World;

/// A call made on the session link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Block(UserId),
    Resume(UserId),
    Text(UserId, String),
    Logout(ConnectionId),
    Kick(ConnectionId),
}

/// A call made on the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveCall {
    User(UserId),
    All(usize),
}

#[derive(Debug, Default)]
struct Log {
    dispatched: Vec<(String, u64)>,
    sessions: Vec<SessionCall>,
    notices: Vec<Notice>,
    placements: Vec<(UserId, RoomId)>,
    removals: Vec<(UserId, RoomId)>,
    saves: Vec<SaveCall>,
    maintenance: Vec<MaintenanceKind>,
    missing_rooms: BTreeSet<RoomId>,
    fail_saves: bool,
}

/// Shared recording fake. Every clone writes to the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Log>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Texts handed to an interpreter, in order.
    pub fn dispatched(&self) -> Vec<String> {
        self.log().dispatched.iter().map(|(t, _)| t.clone()).collect()
    }

    /// `(text, turn)` pairs handed to an interpreter, in order.
    pub fn dispatched_at(&self) -> Vec<(String, u64)> {
        self.log().dispatched.clone()
    }

    pub fn sessions(&self) -> Vec<SessionCall> {
        self.log().sessions.clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.log().notices.clone()
    }

    pub fn placements(&self) -> Vec<(UserId, RoomId)> {
        self.log().placements.clone()
    }

    pub fn removals(&self) -> Vec<(UserId, RoomId)> {
        self.log().removals.clone()
    }

    pub fn saves(&self) -> Vec<SaveCall> {
        self.log().saves.clone()
    }

    pub fn maintenance(&self) -> Vec<MaintenanceKind> {
        self.log().maintenance.clone()
    }

    /// Make `place` fail with `NotFound` for `room`.
    pub fn missing_room(&self, room: RoomId) {
        self.log().missing_rooms.insert(room);
    }

    /// Make every save fail.
    pub fn fail_saves(&self) {
        self.log().fail_saves = true;
    }
}

impl CommandInterpreter for Recorder {
    fn dispatch(
        &mut self,
        command: &Command<'_>,
        ctx: &mut DispatchContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        let text = if command.rest.is_empty() {
            command.verb.clone()
        } else {
            format!("{} {}", command.verb, command.rest)
        };
        self.log().dispatched.push((text, ctx.turn()));
        match command.verb.as_str() {
            "xyzzy" => Ok(DispatchOutcome::NotUnderstood),
            "followup" => {
                ctx.schedule("done", 0, turnward_types::EventFlags::empty());
                Ok(DispatchOutcome::Handled)
            }
            "gone" => Err(DispatchError::ActorMissing {
                originator: ctx.originator(),
            }),
            _ => Ok(DispatchOutcome::Handled),
        }
    }
}

impl RoomDirectory for Recorder {
    fn place(&mut self, user: UserId, room: RoomId) -> Result<(), RoomError> {
        let mut log = self.log();
        if log.missing_rooms.contains(&room) {
            return Err(RoomError::NotFound { room_id: room });
        }
        log.placements.push((user, room));
        Ok(())
    }

    fn remove(&mut self, user: UserId, room: RoomId) {
        self.log().removals.push((user, room));
    }
}

impl SessionLink for Recorder {
    fn block_input(&mut self, user: UserId) {
        self.log().sessions.push(SessionCall::Block(user));
    }

    fn resume_input(&mut self, user: UserId) {
        self.log().sessions.push(SessionCall::Resume(user));
    }

    fn send_text(&mut self, user: UserId, text: &str) {
        self.log().sessions.push(SessionCall::Text(user, text.to_owned()));
    }

    fn logout_connection(&mut self, connection: ConnectionId) {
        self.log().sessions.push(SessionCall::Logout(connection));
    }

    fn kick(&mut self, connection: ConnectionId, _reason: &str) {
        self.log().sessions.push(SessionCall::Kick(connection));
    }
}

impl NoticeSink for Recorder {
    fn deliver(&mut self, notice: &Notice) {
        self.log().notices.push(notice.clone());
    }
}

impl Persistence for Recorder {
    fn save_user(&mut self, user: UserId) -> Result<(), PersistenceError> {
        let mut log = self.log();
        log.saves.push(SaveCall::User(user));
        if log.fail_saves {
            return Err(PersistenceError::User {
                user_id: user,
                reason: "disk full".to_owned(),
            });
        }
        Ok(())
    }

    fn save_all(&mut self, online: &[UserId]) -> Result<usize, PersistenceError> {
        let mut log = self.log();
        log.saves.push(SaveCall::All(online.len()));
        if log.fail_saves {
            return Err(PersistenceError::Unavailable {
                reason: "disk full".to_owned(),
            });
        }
        Ok(online.len())
    }
}

impl Maintenance for Recorder {
    fn run(&mut self, kind: MaintenanceKind) {
        self.log().maintenance.push(kind);
    }
}

/// Services whose every collaborator is a clone of `rec`.
pub fn services_with(rec: &Recorder) -> Services {
    Services {
        interpreter: Box::new(rec.clone()),
        mob_interpreter: Box::new(rec.clone()),
        rooms: Box::new(rec.clone()),
        sessions: Box::new(rec.clone()),
        notices: Box::new(rec.clone()),
        persistence: Box::new(rec.clone()),
        maintenance: Box::new(rec.clone()),
        listeners: ListenerRegistry::new(),
    }
}

/// Profile for user `id` on connection `id + 100`.
pub fn profile(id: u64) -> ActorProfile {
    ActorProfile::new(UserId(id), format!("user{id}"), ConnectionId(id.saturating_add(100)))
}

/// Put user `id` straight into room 1, bypassing lifecycle handling.
pub fn add_user(world: &mut World, id: u64) {
    world.roster.insert(ActorRecord {
        profile: profile(id),
        room_id: RoomId(1),
        zombie_since: None,
        last_input_round: 0,
    });
    world.roster.refresh_stats();
}

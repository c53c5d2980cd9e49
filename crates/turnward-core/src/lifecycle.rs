//! Actor lifecycle transitions.
//!
//! The connection layer signals four transitions over dedicated queues:
//! enter-world, leave-world, logout-by-connection and zombie on/off. Each
//! handler here runs under the world lock in the scheduler task. The
//! per-turn zombie expiry and the per-round inactivity kick live here too,
//! since they are built from the same transitions.

use serde::{Deserialize, Serialize};
use turnward_types::{ConnectionId, Event, Notice, Originator, ReadyTurn, RoomId, UserId};

use crate::roster::{ActorProfile, ActorRecord};
use crate::services::{RoomError, Services};
use crate::world::World;

/// Text sent to an actor five rounds before an inactivity kick.
pub const IDLE_WARNING: &str = "WARNING: You are about to be kicked for inactivity!";

/// Rounds before the cutoff at which the idle warning is sent.
pub const IDLE_WARNING_ROUNDS: u64 = 5;

/// Request to place an actor in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterWorld {
    /// Who is entering.
    pub profile: ActorProfile,
    /// Where they want to be.
    pub room_id: RoomId,
}

/// Soft-disconnect toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZombieFlag {
    /// The actor.
    pub user_id: UserId,
    /// `true` when the connection dropped, `false` on reconnect.
    pub on: bool,
}

/// What an enter-world transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    /// A new actor entered.
    Spawned {
        /// Room the actor ended up in.
        room_id: RoomId,
        /// On-login commands queued.
        login_commands: usize,
    },
    /// An actor already in the world was rebound to a new connection.
    Rebound,
}

/// Place an actor in the world.
///
/// An actor already in the world is rebound to the new connection and takes
/// the incoming profile; its room and idle state are kept. Otherwise this
/// falls back to the configured start room if the requested room does not
/// exist, then queues the on-login commands as immediate events.
pub fn enter_world(
    world: &mut World,
    services: &mut Services,
    request: EnterWorld,
) -> EnterOutcome {
    let EnterWorld { profile, room_id } = request;
    let user = profile.user_id;

    if world.roster.contains(user) {
        let connection = profile.connection_id;
        world.roster.rebind(user, connection);
        if let Some(record) = world.roster.get_mut(user) {
            // Room, idle round and suppression stay with the running actor.
            record.profile = profile;
            record.zombie_since = None;
        }
        world.roster.count_login();
        world.roster.refresh_stats();
        tracing::info!(%user, %connection, "actor re-entered world");
        return EnterOutcome::Rebound;
    }

    let room_id = place_with_fallback(world, services, user, room_id);
    let round = world.clock.round();
    let turn = world.clock.turn();

    world.roster.insert(ActorRecord {
        profile,
        room_id,
        zombie_since: None,
        last_input_round: round,
    });
    world.roster.count_login();
    let stats = world.roster.refresh_stats();
    world.notify(Notice::PlayerSpawn { user_id: user, room_id });

    let commands = world.config.world.on_login_commands.clone();
    for text in &commands {
        world.enqueue(Event::new(
            Originator::User(user),
            text.as_str(),
            ReadyTurn::Immediate,
            turn,
        ));
    }

    tracing::info!(%user, %room_id, online = stats.online, "actor entered world");
    EnterOutcome::Spawned {
        room_id,
        login_commands: commands.len(),
    }
}

fn place_with_fallback(
    world: &World,
    services: &mut Services,
    user: UserId,
    room_id: RoomId,
) -> RoomId {
    match services.rooms.place(user, room_id) {
        Ok(()) => room_id,
        Err(RoomError::NotFound { .. }) => {
            let start = RoomId(world.config.world.start_room);
            tracing::warn!(
                %user,
                requested = %room_id,
                fallback = %start,
                "room not found, using start room"
            );
            if let Err(err) = services.rooms.place(user, start) {
                tracing::error!(%user, room = %start, error = %err, "start room placement failed");
            }
            start
        }
        Err(err) => {
            tracing::error!(%user, %room_id, error = %err, "room placement failed");
            room_id
        }
    }
}

/// Remove an actor from the world. Returns the removed record, or `None` if
/// the actor was not online.
pub fn leave_world(
    world: &mut World,
    services: &mut Services,
    user: UserId,
) -> Option<ActorRecord> {
    let record = world.roster.remove(user)?;
    services.rooms.remove(user, record.room_id);
    world.release_input(user);
    world.roster.refresh_stats();
    world.notify(Notice::PlayerDespawn {
        user_id: user,
        room_id: record.room_id,
    });
    tracing::info!(%user, room_id = %record.room_id, "actor left world");
    Some(record)
}

/// Log out whoever is on `connection`.
///
/// If an actor is bound to the connection it is saved and removed from the
/// world first. The connection is closed either way, which covers clients
/// that drop mid-login before any actor exists.
pub fn logout_connection(world: &mut World, services: &mut Services, connection: ConnectionId) {
    let user = world.roster.user_for_connection(connection);
    if let Some(user) = user {
        if let Err(err) = services.persistence.save_user(user) {
            tracing::error!(%user, %connection, error = %err, "save on logout failed");
        }
        leave_world(world, services, user);
    }
    services.sessions.logout_connection(connection);
    world.notify(Notice::LoggedOut {
        connection_id: connection,
        user_id: user,
    });
    tracing::info!(%connection, user = ?user.map(UserId::get), "connection logged out");
}

/// Set or clear the soft-disconnect flag. Returns whether the actor exists.
pub fn set_zombie(world: &mut World, flag: ZombieFlag) -> bool {
    let turn = world.clock.turn();
    let Some(record) = world.roster.get_mut(flag.user_id) else {
        tracing::debug!(user = %flag.user_id, on = flag.on, "zombie flag for unknown actor");
        return false;
    };
    if flag.on {
        if record.zombie_since.is_none() {
            record.zombie_since = Some(turn);
        }
    } else {
        record.zombie_since = None;
    }
    world.roster.refresh_stats();
    tracing::info!(user = %flag.user_id, on = flag.on, turn, "zombie flag changed");
    true
}

/// Remove zombies whose grace window has passed. Returns how many expired.
pub fn expire_zombies(world: &mut World, services: &mut Services) -> usize {
    let turn = world.clock.turn();
    let expiry = world.config.zombie_expiry_turns();
    let Some(cutoff) = turn.checked_sub(expiry).filter(|c| *c > 0) else {
        return 0;
    };

    let expired: Vec<(UserId, ConnectionId)> = world
        .roster
        .iter()
        .filter(|a| a.zombie_since.is_some_and(|since| since < cutoff))
        .map(|a| (a.profile.user_id, a.profile.connection_id))
        .collect();

    for (user, connection) in &expired {
        tracing::info!(%user, turn, "zombie expired");
        logout_connection(world, services, *connection);
    }
    expired.len()
}

/// Kick actors that have been idle longer than the configured limit.
/// Run on round boundaries. Returns how many were kicked.
pub fn kick_idle(world: &mut World, services: &mut Services) -> usize {
    let max_idle_rounds = world
        .config
        .seconds_to_rounds(world.config.network.max_idle_seconds);
    if max_idle_rounds == 0 {
        return 0;
    }
    let round = world.clock.round();
    let Some(cutoff) = round.checked_sub(max_idle_rounds) else {
        return 0;
    };
    let kick_exempt = !world.config.network.timeout_mods;
    let turn = world.clock.turn();

    let mut kicked = Vec::new();
    for record in world.roster.iter() {
        if record.is_zombie() {
            continue;
        }
        if kick_exempt && record.profile.idle_exempt {
            continue;
        }
        let last = record.last_input_round;
        if last == 0 {
            continue;
        }
        if last.checked_sub(cutoff) == Some(IDLE_WARNING_ROUNDS) {
            services.sessions.send_text(record.profile.user_id, IDLE_WARNING);
        }
        if last < cutoff {
            kicked.push((record.profile.user_id, record.profile.connection_id));
        }
    }

    for (user, connection) in &kicked {
        tracing::info!(%user, round, "inactive kick");
        if let Some(record) = world.roster.get_mut(*user) {
            record.zombie_since.get_or_insert(turn);
        }
        services.sessions.kick(*connection, "inactivity");
    }
    if !kicked.is_empty() {
        world.roster.refresh_stats();
    }
    kicked.len()
}

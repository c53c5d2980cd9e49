//! Who is in the world, where, and over which connection.

use std::collections::BTreeMap;

use serde::Serialize;
use turnward_types::{ActorSummary, ConnectionId, RoomId, UserId};

use crate::macros::MacroTable;

/// What the connection layer knows about an actor when it enters the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorProfile {
    /// The actor.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Connection the actor arrived on.
    pub connection_id: ConnectionId,
    /// Input macros.
    pub macros: MacroTable,
    /// Moderators and admins are not kicked for inactivity by default.
    pub idle_exempt: bool,
}

impl ActorProfile {
    /// A profile with no macros that is subject to the idle kick.
    pub fn new(user_id: UserId, name: impl Into<String>, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            name: name.into(),
            connection_id,
            macros: MacroTable::new(),
            idle_exempt: false,
        }
    }
}

/// An actor currently in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    /// Entry-time profile.
    pub profile: ActorProfile,
    /// Room the actor occupies.
    pub room_id: RoomId,
    /// Turn at which the actor went soft-disconnected, if it has.
    pub zombie_since: Option<u64>,
    /// Round of the last non-empty input.
    pub last_input_round: u64,
}

impl ActorRecord {
    /// Whether the actor is soft-disconnected.
    pub const fn is_zombie(&self) -> bool {
        self.zombie_since.is_some()
    }

    /// Summary for snapshots and the admin surface.
    pub fn summary(&self, suppressed_since: Option<u64>) -> ActorSummary {
        ActorSummary {
            user_id: self.profile.user_id,
            name: self.profile.name.clone(),
            connection_id: self.profile.connection_id,
            room_id: self.room_id,
            zombie: self.is_zombie(),
            last_input_round: self.last_input_round,
            suppressed_since,
        }
    }
}

/// Aggregate online counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OnlineStats {
    /// Actors in the world, zombies included.
    pub online: u64,
    /// Soft-disconnected actors.
    pub zombies: u64,
    /// Highest `online` seen.
    pub peak_online: u64,
    /// Enter-world transitions since startup.
    pub total_logins: u64,
}

/// Online actors indexed by user and by connection.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    actors: BTreeMap<UserId, ActorRecord>,
    by_connection: BTreeMap<ConnectionId, UserId>,
    stats: OnlineStats,
}

impl Roster {
    /// An empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an actor, replacing any record with the same user id. Returns
    /// the replaced record.
    pub fn insert(&mut self, record: ActorRecord) -> Option<ActorRecord> {
        let user = record.profile.user_id;
        let previous = self.actors.remove(&user);
        if let Some(prev) = &previous {
            self.by_connection.remove(&prev.profile.connection_id);
        }
        self.by_connection.insert(record.profile.connection_id, user);
        self.actors.insert(user, record);
        previous
    }

    /// Remove an actor.
    pub fn remove(&mut self, user: UserId) -> Option<ActorRecord> {
        let record = self.actors.remove(&user)?;
        self.by_connection.remove(&record.profile.connection_id);
        Some(record)
    }

    /// Look up an actor.
    pub fn get(&self, user: UserId) -> Option<&ActorRecord> {
        self.actors.get(&user)
    }

    /// Look up an actor for mutation. The connection index is unaffected,
    /// so use [`Roster::rebind`] to change connections.
    pub fn get_mut(&mut self, user: UserId) -> Option<&mut ActorRecord> {
        self.actors.get_mut(&user)
    }

    /// Whether `user` is in the world.
    pub fn contains(&self, user: UserId) -> bool {
        self.actors.contains_key(&user)
    }

    /// Resolve the actor bound to `connection`.
    pub fn user_for_connection(&self, connection: ConnectionId) -> Option<UserId> {
        self.by_connection.get(&connection).copied()
    }

    /// Move `user` onto a new connection.
    pub fn rebind(&mut self, user: UserId, connection: ConnectionId) -> bool {
        let Some(record) = self.actors.get_mut(&user) else {
            return false;
        };
        self.by_connection.remove(&record.profile.connection_id);
        record.profile.connection_id = connection;
        self.by_connection.insert(connection, user);
        true
    }

    /// Iterate actors in user-id order.
    pub fn iter(&self) -> impl Iterator<Item = &ActorRecord> {
        self.actors.values()
    }

    /// Online user ids in order.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.actors.keys().copied().collect()
    }

    /// Number of actors in the world.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether the world is empty.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Count a login.
    pub const fn count_login(&mut self) {
        self.stats.total_logins = self.stats.total_logins.saturating_add(1);
    }

    /// Recompute the online and zombie counters and the peak.
    pub fn refresh_stats(&mut self) -> OnlineStats {
        let online = u64::try_from(self.actors.len()).unwrap_or(u64::MAX);
        let zombies = self.actors.values().filter(|a| a.is_zombie()).count();
        self.stats.online = online;
        self.stats.zombies = u64::try_from(zombies).unwrap_or(u64::MAX);
        self.stats.peak_online = self.stats.peak_online.max(online);
        self.stats
    }

    /// Last computed counters.
    pub const fn stats(&self) -> OnlineStats {
        self.stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(user: u64, conn: u64) -> ActorRecord {
        ActorRecord {
            profile: ActorProfile::new(UserId(user), format!("user{user}"), ConnectionId(conn)),
            room_id: RoomId(1),
            zombie_since: None,
            last_input_round: 0,
        }
    }

    #[test]
    fn connection_index_follows_inserts_and_removes() {
        let mut roster = Roster::new();
        roster.insert(record(1, 10));
        roster.insert(record(2, 20));
        assert_eq!(roster.user_for_connection(ConnectionId(10)), Some(UserId(1)));

        let removed = roster.remove(UserId(1)).unwrap();
        assert_eq!(removed.profile.name, "user1");
        assert_eq!(roster.user_for_connection(ConnectionId(10)), None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn reinsert_drops_old_connection() {
        let mut roster = Roster::new();
        roster.insert(record(1, 10));
        let previous = roster.insert(record(1, 11));
        assert!(previous.is_some());
        assert_eq!(roster.user_for_connection(ConnectionId(10)), None);
        assert_eq!(roster.user_for_connection(ConnectionId(11)), Some(UserId(1)));
    }

    #[test]
    fn rebind_moves_connection() {
        let mut roster = Roster::new();
        roster.insert(record(1, 10));
        assert!(roster.rebind(UserId(1), ConnectionId(12)));
        assert_eq!(roster.user_for_connection(ConnectionId(12)), Some(UserId(1)));
        assert_eq!(roster.user_for_connection(ConnectionId(10)), None);
        assert!(!roster.rebind(UserId(9), ConnectionId(13)));
    }

    #[test]
    fn stats_track_peak_and_zombies() {
        let mut roster = Roster::new();
        roster.insert(record(1, 10));
        roster.insert(record(2, 20));
        roster.get_mut(UserId(2)).unwrap().zombie_since = Some(5);
        let stats = roster.refresh_stats();
        assert_eq!(stats.online, 2);
        assert_eq!(stats.zombies, 1);
        assert_eq!(stats.peak_online, 2);

        roster.remove(UserId(1));
        let stats = roster.refresh_stats();
        assert_eq!(stats.online, 1);
        assert_eq!(stats.peak_online, 2);
    }
}

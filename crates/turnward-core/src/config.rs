//! Configuration loading and typed config structures for the Turnward server.
//!
//! The canonical configuration lives in `turnward-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, a loader that reads the file and clamps out-of-range values,
//! and [`LiveConfig`], the hot-reloadable handle the scheduler reads once per
//! turn.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `turnward-config.yaml`. All fields have
/// defaults; values are clamped by [`ServerConfig::validate`], which the
/// loaders call before returning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Turn and round timing.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Connection-level policies (zombie grace, idle kick).
    #[serde(default)]
    pub network: NetworkConfig,

    /// World entry settings.
    #[serde(default)]
    pub world: WorldConfig,

    /// Periodic maintenance cadences.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Ingestion queue settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Admin HTTP surface.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Values derived from `timing` by [`ServerConfig::validate`].
    #[serde(skip)]
    derived: DerivedTiming,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut config = Self {
            timing: TimingConfig::default(),
            network: NetworkConfig::default(),
            world: WorldConfig::default(),
            maintenance: MaintenanceConfig::default(),
            ingest: IngestConfig::default(),
            observer: ObserverConfig::default(),
            logging: LoggingConfig::default(),
            derived: DerivedTiming::default(),
        };
        config.validate();
        config
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            serde_yml::from_str("{}")?
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate();
        Ok(config)
    }

    /// Clamp out-of-range values to their defaults and recompute the cached
    /// derived timing values.
    pub fn validate(&mut self) {
        let t = &mut self.timing;
        if t.turn_ms < MIN_TURN_MS {
            t.turn_ms = default_turn_ms();
        }
        if t.round_seconds < 1 {
            t.round_seconds = default_round_seconds();
        }
        if t.rounds_per_auto_save < 1 {
            t.rounds_per_auto_save = default_rounds_per_auto_save();
        }

        let m = &mut self.maintenance;
        m.drain_ms = m.drain_ms.max(1);
        m.room_maintenance_secs = m.room_maintenance_secs.max(1);
        m.alias_reload_secs = m.alias_reload_secs.max(1);
        m.stats_log_secs = m.stats_log_secs.max(1);

        self.ingest.queue_capacity = self.ingest.queue_capacity.max(1);

        self.derived = DerivedTiming::from_timing(&self.timing);
    }

    /// Turns in one round, at least 1.
    pub const fn turns_per_round(&self) -> u64 {
        self.derived.turns_per_round
    }

    /// Turns in one second, at least 1.
    pub const fn turns_per_second(&self) -> u64 {
        self.derived.turns_per_second
    }

    /// Turns between automatic saves.
    pub const fn turns_per_auto_save(&self) -> u64 {
        self.derived.turns_per_auto_save
    }

    /// Convert seconds to turns, rounding up.
    pub fn seconds_to_turns(&self, seconds: u64) -> u64 {
        seconds.saturating_mul(1000).div_ceil(self.timing.turn_ms.max(1))
    }

    /// Convert seconds to rounds, rounding up.
    pub fn seconds_to_rounds(&self, seconds: u64) -> u64 {
        seconds.div_ceil(self.timing.round_seconds.max(1))
    }

    /// Turns a zombie may linger before it is removed from the world.
    pub const fn zombie_expiry_turns(&self) -> u64 {
        self.network
            .zombie_seconds
            .saturating_mul(self.derived.turns_per_second)
    }

    /// Return a copy with a new turn period, re-validated.
    #[must_use]
    pub fn with_turn_ms(&self, turn_ms: u64) -> Self {
        let mut next = self.clone();
        next.timing.turn_ms = turn_ms;
        next.validate();
        next
    }
}

/// Smallest accepted turn period; anything lower falls back to the default.
pub const MIN_TURN_MS: u64 = 10;

/// Values computed from [`TimingConfig`] once per validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DerivedTiming {
    turns_per_round: u64,
    turns_per_second: u64,
    turns_per_auto_save: u64,
}

impl Default for DerivedTiming {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

impl DerivedTiming {
    fn from_timing(t: &TimingConfig) -> Self {
        let turn_ms = t.turn_ms.max(1);
        let turns_per_round = t
            .round_seconds
            .saturating_mul(1000)
            .checked_div(turn_ms)
            .unwrap_or(1)
            .max(1);
        let turns_per_second = 1000_u64.checked_div(turn_ms).unwrap_or(1).max(1);
        let turns_per_auto_save = t.rounds_per_auto_save.saturating_mul(turns_per_round);
        Self {
            turns_per_round,
            turns_per_second,
            turns_per_auto_save,
        }
    }
}

/// Turn and round timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Real-time milliseconds per turn.
    #[serde(default = "default_turn_ms")]
    pub turn_ms: u64,

    /// Real-time seconds per round.
    #[serde(default = "default_round_seconds")]
    pub round_seconds: u64,

    /// Rounds between automatic saves.
    #[serde(default = "default_rounds_per_auto_save")]
    pub rounds_per_auto_save: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            turn_ms: default_turn_ms(),
            round_seconds: default_round_seconds(),
            rounds_per_auto_save: default_rounds_per_auto_save(),
        }
    }
}

/// Connection-level policies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    /// Seconds a soft-disconnected actor keeps its world presence. Zero
    /// removes zombies on the next turn.
    #[serde(default = "default_zombie_seconds")]
    pub zombie_seconds: u64,

    /// Seconds without input before an actor is kicked. Zero disables the
    /// inactivity kick.
    #[serde(default = "default_max_idle_seconds")]
    pub max_idle_seconds: u64,

    /// Whether idle-exempt actors (moderators) are kicked too.
    #[serde(default)]
    pub timeout_mods: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            zombie_seconds: default_zombie_seconds(),
            max_idle_seconds: default_max_idle_seconds(),
            timeout_mods: false,
        }
    }
}

/// World entry settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Room used when an entering actor's room cannot be found.
    #[serde(default = "default_start_room")]
    pub start_room: u64,

    /// Commands queued as immediate events for every actor entering the world.
    #[serde(default)]
    pub on_login_commands: Vec<String>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            start_room: default_start_room(),
            on_login_commands: Vec::new(),
        }
    }
}

/// Periodic maintenance cadences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaintenanceConfig {
    /// Period of the notice drain timer in milliseconds.
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,

    /// Seconds between room maintenance passes.
    #[serde(default = "default_room_maintenance_secs")]
    pub room_maintenance_secs: u64,

    /// Seconds between alias reloads.
    #[serde(default = "default_alias_reload_secs")]
    pub alias_reload_secs: u64,

    /// Seconds between statistics log lines.
    #[serde(default = "default_stats_log_secs")]
    pub stats_log_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            drain_ms: default_drain_ms(),
            room_maintenance_secs: default_room_maintenance_secs(),
            alias_reload_secs: default_alias_reload_secs(),
            stats_log_secs: default_stats_log_secs(),
        }
    }
}

/// Ingestion queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Capacity of the bounded submission queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Admin HTTP surface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether the admin surface is started.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Live configuration
// ---------------------------------------------------------------------------

/// Shared, hot-reloadable configuration.
///
/// Readers take a cheap `Arc` snapshot with [`LiveConfig::current`]; updates
/// are validated and broadcast to every clone.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    tx: Arc<watch::Sender<Arc<ServerConfig>>>,
}

impl LiveConfig {
    /// Wrap an initial configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    /// The configuration in effect right now.
    pub fn current(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the whole configuration. The value is validated first.
    pub fn replace(&self, mut config: ServerConfig) {
        config.validate();
        self.tx.send_replace(Arc::new(config));
    }

    /// Change the turn period. Returns the effective (clamped) value.
    pub fn set_turn_ms(&self, turn_ms: u64) -> u64 {
        let next = self.current().with_turn_ms(turn_ms);
        let effective = next.timing.turn_ms;
        self.tx.send_replace(Arc::new(next));
        tracing::info!(turn_ms = effective, "turn period updated");
        effective
    }

    /// Subscribe to configuration changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ServerConfig>> {
        self.tx.subscribe()
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_turn_ms() -> u64 {
    100
}

const fn default_round_seconds() -> u64 {
    4
}

const fn default_rounds_per_auto_save() -> u64 {
    900
}

const fn default_zombie_seconds() -> u64 {
    60
}

const fn default_max_idle_seconds() -> u64 {
    600
}

const fn default_start_room() -> u64 {
    1
}

const fn default_drain_ms() -> u64 {
    1
}

const fn default_room_maintenance_secs() -> u64 {
    3
}

const fn default_alias_reload_secs() -> u64 {
    4
}

const fn default_stats_log_secs() -> u64 {
    60
}

const fn default_queue_capacity() -> usize {
    1024
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

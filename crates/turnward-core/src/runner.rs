//! The scheduler loop.
//!
//! [`Scheduler::run`] is the single task that owns the world. It multiplexes
//! the turn timer, the four lifecycle queues, the notice drain and three
//! maintenance timers over one `tokio::select!`, and takes the world lock
//! through its [`WorldWriter`] for every branch:
//!
//! - **Turn**: merge ingested events, advance the clock, expire zombies,
//!   auto-save, run admission, and on a round boundary notify and kick idle
//!   actors. Skipped while the operator has paused the scheduler.
//! - **Lifecycle**: enter-world, leave-world, logout-by-connection, zombie.
//! - **Drain**: deliver queued notices through the listener chain.
//! - **Maintenance**: room upkeep, alias reload, stats logging.
//!
//! A snapshot is published after every branch that changes the world.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use turnward_types::{ConnectionId, Event, Notice, UserId, WorldEvent};

use crate::admission::{AdmissionReport, run_admission};
use crate::arbiter::WorldWriter;
use crate::clock::{ClockError, ClockGauge};
use crate::config::{LiveConfig, ServerConfig};
use crate::lifecycle::{self, EnterWorld, ZombieFlag};
use crate::listener::Verdict;
use crate::operator::OperatorState;
use crate::services::{MaintenanceKind, Services};
use crate::world::World;

/// Errors that stop the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A lifecycle signal was sent after the scheduler stopped.
    #[error("scheduler is not running, {signal} signal dropped")]
    Closed {
        /// Which queue the signal was meant for.
        signal: &'static str,
    },
}

/// Cloneable sender side of the four lifecycle queues.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    enter: mpsc::UnboundedSender<EnterWorld>,
    leave: mpsc::UnboundedSender<UserId>,
    logout: mpsc::UnboundedSender<ConnectionId>,
    zombie: mpsc::UnboundedSender<ZombieFlag>,
}

impl LifecycleHandle {
    /// Ask the scheduler to place an actor in the world.
    pub fn enter_world(&self, request: EnterWorld) -> Result<(), SchedulerError> {
        self.enter
            .send(request)
            .map_err(|_closed| SchedulerError::Closed { signal: "enter-world" })
    }

    /// Ask the scheduler to remove an actor from the world.
    pub fn leave_world(&self, user: UserId) -> Result<(), SchedulerError> {
        self.leave
            .send(user)
            .map_err(|_closed| SchedulerError::Closed { signal: "leave-world" })
    }

    /// Ask the scheduler to log out whoever is on `connection`.
    pub fn logout_connection(&self, connection: ConnectionId) -> Result<(), SchedulerError> {
        self.logout
            .send(connection)
            .map_err(|_closed| SchedulerError::Closed { signal: "logout" })
    }

    /// Ask the scheduler to set or clear an actor's zombie flag.
    pub fn set_zombie(&self, user: UserId, on: bool) -> Result<(), SchedulerError> {
        self.zombie
            .send(ZombieFlag { user_id: user, on })
            .map_err(|_closed| SchedulerError::Closed { signal: "zombie" })
    }
}

struct LifecycleInbox {
    enter: mpsc::UnboundedReceiver<EnterWorld>,
    leave: mpsc::UnboundedReceiver<UserId>,
    logout: mpsc::UnboundedReceiver<ConnectionId>,
    zombie: mpsc::UnboundedReceiver<ZombieFlag>,
}

fn lifecycle_channels() -> (LifecycleHandle, LifecycleInbox) {
    let (enter_tx, enter) = mpsc::unbounded_channel();
    let (leave_tx, leave) = mpsc::unbounded_channel();
    let (logout_tx, logout) = mpsc::unbounded_channel();
    let (zombie_tx, zombie) = mpsc::unbounded_channel();
    (
        LifecycleHandle {
            enter: enter_tx,
            leave: leave_tx,
            logout: logout_tx,
            zombie: zombie_tx,
        },
        LifecycleInbox {
            enter,
            leave,
            logout,
            zombie,
        },
    )
}

/// Everything other tasks need to feed the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerLinks {
    /// Lock-free turn and round counters.
    pub gauge: ClockGauge,
    /// Where the ingestion worker forwards events.
    pub events: mpsc::UnboundedSender<Event>,
    /// Lifecycle signals from connection tasks.
    pub lifecycle: LifecycleHandle,
}

/// What happened on one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    /// The turn that ran.
    pub turn: u64,
    /// Set when this turn started a new round.
    pub new_round: Option<u64>,
    /// Events merged from the ingestion worker.
    pub ingested: u64,
    /// Zombies removed.
    pub zombies_expired: u64,
    /// Actors kicked for inactivity.
    pub idle_kicked: u64,
    /// Whether an auto-save ran.
    pub auto_saved: bool,
    /// Admission counters.
    pub admission: AdmissionReport,
}

/// Result of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Turns processed (paused turns excluded).
    pub turns_run: u64,
    /// Clock turn at shutdown.
    pub final_turn: u64,
    /// Clock round at shutdown.
    pub final_round: u64,
    /// Actors saved by the shutdown save, if it succeeded.
    pub saved_on_shutdown: Option<usize>,
}

struct Core {
    writer: WorldWriter,
    services: Services,
    live: LiveConfig,
    operator: Arc<OperatorState>,
    gauge: ClockGauge,
    events: mpsc::UnboundedReceiver<Event>,
    turns_run: u64,
}

/// The world-owning scheduler task.
pub struct Scheduler {
    core: Core,
    lifecycle: LifecycleInbox,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("turns_run", &self.core.turns_run)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler around the world behind `writer`.
    pub fn new(
        writer: WorldWriter,
        services: Services,
        live: LiveConfig,
        operator: Arc<OperatorState>,
    ) -> (Self, SchedulerLinks) {
        let gauge = ClockGauge::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (lifecycle, inbox) = lifecycle_channels();
        let links = SchedulerLinks {
            gauge: gauge.clone(),
            events: events_tx,
            lifecycle,
        };
        let core = Core {
            writer,
            services,
            live,
            operator,
            gauge,
            events,
            turns_run: 0,
        };
        (
            Self {
                core,
                lifecycle: inbox,
            },
            links,
        )
    }

    /// Run until the operator requests a stop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Clock`] if the turn counter overflows.
    pub async fn run(self) -> Result<RunSummary, SchedulerError> {
        let Self {
            mut core,
            lifecycle: mut inbox,
        } = self;
        let config = core.live.current();
        let operator = Arc::clone(&core.operator);

        let turn_sleep = tokio::time::sleep(turn_period(&config));
        tokio::pin!(turn_sleep);
        let mut drain = fixed_interval(Duration::from_millis(config.maintenance.drain_ms));
        let mut rooms =
            fixed_interval(Duration::from_secs(config.maintenance.room_maintenance_secs));
        let mut aliases = fixed_interval(Duration::from_secs(config.maintenance.alias_reload_secs));
        let mut stats = fixed_interval(Duration::from_secs(config.maintenance.stats_log_secs));

        tracing::info!(
            turn_ms = config.timing.turn_ms,
            turns_per_round = config.turns_per_round(),
            turns_per_auto_save = config.turns_per_auto_save(),
            "scheduler starting"
        );

        loop {
            tokio::select! {
                biased;
                () = operator.stopped() => {
                    tracing::info!("operator stop requested");
                    break;
                }
                () = &mut turn_sleep => {
                    core.on_turn().await?;
                    let period = turn_period(&core.live.current());
                    turn_sleep.as_mut().reset(deadline(period));
                }
                Some(request) = inbox.enter.recv() => {
                    core.lifecycle(|w, s| {
                        lifecycle::enter_world(w, s, request);
                    }).await;
                }
                Some(user) = inbox.leave.recv() => {
                    core.lifecycle(|w, s| {
                        lifecycle::leave_world(w, s, user);
                    }).await;
                }
                Some(connection) = inbox.logout.recv() => {
                    core.lifecycle(|w, s| lifecycle::logout_connection(w, s, connection)).await;
                }
                Some(flag) = inbox.zombie.recv() => {
                    core.lifecycle(|w, _| {
                        lifecycle::set_zombie(w, flag);
                    }).await;
                }
                _ = drain.tick() => core.on_drain().await,
                _ = rooms.tick() => core.maintenance(MaintenanceKind::RoomMaintenance).await,
                _ = aliases.tick() => core.maintenance(MaintenanceKind::AliasReload).await,
                _ = stats.tick() => core.maintenance(MaintenanceKind::StatsLog).await,
            }
        }

        core.shutdown().await
    }
}

impl Core {
    async fn on_turn(&mut self) -> Result<Option<TurnReport>, SchedulerError> {
        if self.operator.is_paused() {
            return Ok(None);
        }
        let started = Instant::now();
        let config = self.live.current();

        let mut inbound = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            inbound.push(event);
        }

        let services = &mut self.services;
        let gauge = &self.gauge;
        let report = self
            .writer
            .write(|w| run_turn(w, services, gauge, config, inbound))
            .await?;

        self.turns_run = self.turns_run.saturating_add(1);
        self.operator.record_tick(started.elapsed());
        self.writer.publish().await;

        tracing::trace!(
            turn = report.turn,
            dispatched = report.admission.dispatched,
            deferred = report.admission.deferred,
            "turn complete"
        );
        Ok(Some(report))
    }

    async fn lifecycle(&mut self, f: impl FnOnce(&mut World, &mut Services)) {
        let services = &mut self.services;
        self.writer.write(|w| f(w, services)).await;
        self.writer.publish().await;
    }

    async fn on_drain(&mut self) {
        let broadcasts = self.operator.drain_broadcasts().await;
        let services = &mut self.services;
        let delivered = self
            .writer
            .write(|w| {
                for text in broadcasts {
                    w.notify(Notice::Broadcast { text });
                }
                drain_notices(w, services)
            })
            .await;
        if delivered > 0 {
            self.writer.publish().await;
        }
    }

    async fn maintenance(&mut self, kind: MaintenanceKind) {
        let services = &mut self.services;
        let stats = self
            .writer
            .write(|w| {
                services.maintenance.run(kind);
                w.roster.stats()
            })
            .await;
        if kind == MaintenanceKind::StatsLog {
            let timing = self.operator.tick_timing();
            tracing::info!(
                online = stats.online,
                zombies = stats.zombies,
                peak_online = stats.peak_online,
                total_logins = stats.total_logins,
                ticks = timing.count,
                last_tick_us = timing.last_us,
                max_tick_us = timing.max_us,
                mean_tick_us = timing.mean_us,
                "scheduler stats"
            );
        }
    }

    async fn shutdown(mut self) -> Result<RunSummary, SchedulerError> {
        let services = &mut self.services;
        let (final_turn, final_round, saved) = self
            .writer
            .write(|w| {
                drain_notices(w, services);
                let saved = match services.persistence.save_all(&w.roster.user_ids()) {
                    Ok(count) => Some(count),
                    Err(err) => {
                        tracing::error!(error = %err, "shutdown save failed");
                        None
                    }
                };
                (w.clock.turn(), w.clock.round(), saved)
            })
            .await;
        self.writer.publish().await;

        let summary = RunSummary {
            turns_run: self.turns_run,
            final_turn,
            final_round,
            saved_on_shutdown: saved,
        };
        tracing::info!(
            turns_run = summary.turns_run,
            final_turn,
            final_round,
            saved = ?saved,
            "scheduler stopped"
        );
        Ok(summary)
    }
}

/// One turn under the world lock.
fn run_turn(
    world: &mut World,
    services: &mut Services,
    gauge: &ClockGauge,
    config: Arc<ServerConfig>,
    inbound: Vec<Event>,
) -> Result<TurnReport, ClockError> {
    world.config = config;
    let ingested = u64::try_from(inbound.len()).unwrap_or(u64::MAX);
    world.backlog.extend(inbound);

    let advance = world.clock.advance(world.config.turns_per_round())?;
    gauge.publish(&world.clock);

    let zombies_expired = lifecycle::expire_zombies(world, services);

    let auto_saved = advance
        .turn
        .checked_rem(world.config.turns_per_auto_save())
        == Some(0);
    if auto_saved {
        match services.persistence.save_all(&world.roster.user_ids()) {
            Ok(count) => tracing::info!(turn = advance.turn, saved = count, "auto-save complete"),
            Err(err) => tracing::error!(turn = advance.turn, error = %err, "auto-save failed"),
        }
    }

    let admission = run_admission(world, services);

    let mut idle_kicked = 0;
    if let Some(round) = advance.new_round {
        world.notify(Notice::NewRound {
            round,
            turn: advance.turn,
        });
        idle_kicked = lifecycle::kick_idle(world, services);
        tracing::debug!(round, turn = advance.turn, "new round");
    }

    Ok(TurnReport {
        turn: advance.turn,
        new_round: advance.new_round,
        ingested,
        zombies_expired: u64::try_from(zombies_expired).unwrap_or(u64::MAX),
        idle_kicked: u64::try_from(idle_kicked).unwrap_or(u64::MAX),
        auto_saved,
        admission,
    })
}

/// Deliver every queued notice through the listener chain to the sink.
/// Returns how many were taken off the queue.
fn drain_notices(world: &mut World, services: &mut Services) -> usize {
    let mut taken = 0_usize;
    while let Some(notice) = world.notices.pop_front() {
        taken = taken.saturating_add(1);
        let event = WorldEvent::Notice(notice);
        if services.listeners.run(&event) == Verdict::Handled {
            tracing::debug!(kind = ?event.kind(), "notice handled by listener");
            continue;
        }
        if let WorldEvent::Notice(notice) = &event {
            services.notices.deliver(notice);
        }
    }
    taken
}

fn turn_period(config: &ServerConfig) -> Duration {
    Duration::from_millis(config.timing.turn_ms)
}

fn deadline(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or(now)
}

fn fixed_interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(deadline(period), period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

//! Engine binary for the Turnward server.
//!
//! This is the main entry point that wires the scheduler, the ingestion
//! worker and the admin API together. It loads configuration, initializes
//! all subsystems, and runs the scheduler until the operator or `Ctrl-C`
//! stops it.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `turnward-config.yaml` (or `$TURNWARD_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the world and put it behind the world lock
//! 4. Create the scheduler and its lifecycle queues
//! 5. Spawn the ingestion worker
//! 6. Spawn the admin API server
//! 7. Install the `Ctrl-C` handler
//! 8. Run the scheduler, then wind the background tasks down

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use turnward_core::arbiter::arbiter;
use turnward_core::config::{LiveConfig, LoggingConfig, ServerConfig};
use turnward_core::ingest::{ingest_channel, run_ingest_worker};
use turnward_core::operator::OperatorState;
use turnward_core::runner::Scheduler;
use turnward_core::services::Services;
use turnward_core::suppression::InputGates;
use turnward_core::world::World;
use turnward_observer::server::ServerConfig as ObserverServerConfig;
use turnward_observer::startup::spawn_observer;
use turnward_observer::state::AppState;

use crate::error::EngineError;

const DEFAULT_CONFIG_PATH: &str = "turnward-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the admin server
/// cannot start, or the scheduler fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so remember where it
    //    came from and report it below.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        source = %source,
        turn_ms = config.timing.turn_ms,
        round_seconds = config.timing.round_seconds,
        turns_per_round = config.turns_per_round(),
        zombie_seconds = config.network.zombie_seconds,
        max_idle_seconds = config.network.max_idle_seconds,
        "turnward-engine starting"
    );

    // 3. Build the world.
    let live = LiveConfig::new(config.clone());
    let gates = InputGates::new();
    let world = World::new(live.current(), gates.clone());
    let (writer, reader) = arbiter(world);
    let operator = Arc::new(OperatorState::new());

    // 4. Create the scheduler. The collaborators here only log; a game
    //    server replaces them with its interpreter, rooms and storage.
    let (scheduler, links) = Scheduler::new(
        writer,
        Services::default(),
        live.clone(),
        Arc::clone(&operator),
    );

    // 5. Spawn the ingestion worker.
    let (ingest, submissions) = ingest_channel(config.ingest.queue_capacity, gates);
    let ingest_worker = tokio::spawn(run_ingest_worker(
        submissions,
        links.gauge.clone(),
        links.events.clone(),
    ));
    info!(
        queue_capacity = config.ingest.queue_capacity,
        "Ingestion worker started"
    );

    // 6. Start the admin API server.
    let observer_handle = if config.observer.enabled {
        let state = Arc::new(AppState::new(
            reader,
            links.gauge.clone(),
            Arc::clone(&operator),
            live,
        ));
        let shutdown = {
            let operator = Arc::clone(&operator);
            async move { operator.stopped().await }
        };
        let handle = spawn_observer(ObserverServerConfig::from(&config.observer), state, shutdown)
            .map_err(|e| EngineError::Observer {
                message: format!("{e}"),
            })?;
        Some(handle)
    } else {
        info!("Admin API disabled");
        None
    };

    // 7. Ctrl-C requests the same clean stop as the operator endpoint.
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping");
                    operator.request_stop();
                }
                Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
            }
        });
    }

    // 8. Run the scheduler. The ingest handle and lifecycle queues stay
    //    open until it returns; a connection layer would clone them here.
    let summary = scheduler.run().await.map_err(EngineError::from)?;
    drop(ingest);
    drop(links);

    let forwarded = ingest_worker.await.map_err(|e| EngineError::Task {
        task: "ingest",
        message: format!("{e}"),
    })?;
    if let Some(handle) = observer_handle {
        handle.await.map_err(|e| EngineError::Task {
            task: "observer",
            message: format!("{e}"),
        })?;
    }

    info!(
        turns_run = summary.turns_run,
        final_turn = summary.final_turn,
        final_round = summary.final_round,
        saved_on_shutdown = ?summary.saved_on_shutdown,
        ingested = forwarded,
        "turnward-engine shutdown complete"
    );

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `$TURNWARD_CONFIG` or `turnward-config.yaml`.
///
/// A missing file falls back to defaults. Returns the config and a label
/// describing where it came from.
fn load_config() -> Result<(ServerConfig, String), EngineError> {
    let path = std::env::var_os("TURNWARD_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = ServerConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        Ok((ServerConfig::default(), "defaults".to_owned()))
    }
}

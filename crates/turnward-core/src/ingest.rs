//! Raw input ingestion.
//!
//! Connection tasks submit `(originator, text)` pairs through an
//! [`IngestHandle`]. A single worker task turns each submission into an
//! [`Event`] stamped with the current turn and forwards it to the scheduler,
//! which appends it to the backlog at the start of the next turn. The worker
//! does no admission logic and never touches the world lock.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use turnward_types::{Event, Originator, ReadyTurn, UserId};

use crate::clock::ClockGauge;
use crate::suppression::InputGates;

/// Errors returned to a submitting connection task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The actor is in the middle of a blocking action.
    #[error("input for user {user_id} is suspended until the current action completes")]
    InputBlocked {
        /// The suppressed actor.
        user_id: UserId,
    },

    /// The ingestion worker has shut down.
    #[error("ingestion worker is no longer running")]
    Closed,
}

/// One raw command from a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Who typed it.
    pub originator: Originator,
    /// What was typed.
    pub text: String,
}

/// Cloneable submission handle given to connection tasks.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Submission>,
    gates: InputGates,
}

impl IngestHandle {
    /// Submit raw input, waiting for queue capacity if necessary.
    ///
    /// # Errors
    ///
    /// [`SubmitError::InputBlocked`] if a user is suppressed, and
    /// [`SubmitError::Closed`] once the worker is gone.
    pub async fn submit(
        &self,
        originator: Originator,
        text: impl Into<String>,
    ) -> Result<(), SubmitError> {
        if let Some(user_id) = originator.user() {
            if self.gates.is_blocked(user_id) {
                return Err(SubmitError::InputBlocked { user_id });
            }
        }
        let submission = Submission {
            originator,
            text: text.into(),
        };
        if self.tx.send(submission).await.is_err() {
            return Err(SubmitError::Closed);
        }
        Ok(())
    }
}

/// Build the submission queue.
///
/// Returns the handle for connection tasks and the receiver to pass to
/// [`run_ingest_worker`].
pub fn ingest_channel(
    capacity: usize,
    gates: InputGates,
) -> (IngestHandle, mpsc::Receiver<Submission>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngestHandle { tx, gates }, rx)
}

/// Translate submissions into events until every handle is dropped or the
/// scheduler side goes away. Returns the number of events forwarded.
pub async fn run_ingest_worker(
    mut rx: mpsc::Receiver<Submission>,
    gauge: ClockGauge,
    events: mpsc::UnboundedSender<Event>,
) -> u64 {
    let mut forwarded: u64 = 0;
    tracing::info!("ingestion worker started");
    while let Some(Submission { originator, text }) = rx.recv().await {
        let turn = gauge.turn();
        let event = Event::new(originator, text, ReadyTurn::At(turn), turn);
        tracing::trace!(%originator, event_id = %event.id, turn, "input ingested");
        if events.send(event).is_err() {
            tracing::warn!("scheduler inbox closed, ingestion worker exiting");
            break;
        }
        forwarded = forwarded.saturating_add(1);
    }
    tracing::info!(forwarded, "ingestion worker stopped");
    forwarded
}

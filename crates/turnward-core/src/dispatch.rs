//! The contract between the scheduler and the gameplay command interpreter.
//!
//! The scheduler hands each admitted [`Event`] to a [`CommandInterpreter`]
//! as a parsed [`Command`] together with a [`DispatchContext`]. The context
//! exposes the clock and collects follow-up events and notices the handler
//! wants to emit; the scheduler merges them after the admission pass, so a
//! follow-up is never evaluated during the pass that created it.
//!
//! Each call is isolated: a panicking or failing handler is logged and the
//! tick carries on with the next event.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use turnward_types::{Event, EventFlags, EventId, Notice, Originator, ReadyTurn};

/// Errors a command interpreter may report.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The originating actor no longer exists (disconnected or destroyed
    /// between submission and dispatch).
    #[error("actor {originator} is no longer present")]
    ActorMissing {
        /// Who submitted the event.
        originator: Originator,
    },

    /// The handler failed for a reason of its own.
    #[error("command handler failed: {reason}")]
    Failed {
        /// Handler-provided explanation.
        reason: String,
    },
}

/// What the interpreter made of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The verb was recognized and executed.
    Handled,
    /// The verb was not recognized.
    NotUnderstood,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    /// First word, lowercased.
    pub verb: String,
    /// Everything after the first run of whitespace, trimmed.
    pub rest: &'a str,
    /// Who submitted it.
    pub originator: Originator,
    /// Flags carried by the event.
    pub flags: EventFlags,
    /// The event being dispatched.
    pub event_id: EventId,
}

/// Split `text` into a lowercased verb and the remaining arguments.
/// Returns `None` for blank input.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (verb, rest) = text
        .split_once(char::is_whitespace)
        .unwrap_or((text, ""));
    Some((verb.to_lowercase(), rest.trim()))
}

/// Clock values and output buffers available to a handler.
#[derive(Debug)]
pub struct DispatchContext {
    turn: u64,
    round: u64,
    originator: Originator,
    scheduled: Vec<Event>,
    notices: Vec<Notice>,
}

impl DispatchContext {
    /// A context for `originator` during `turn`/`round`.
    pub const fn new(turn: u64, round: u64, originator: Originator) -> Self {
        Self {
            turn,
            round,
            originator,
            scheduled: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Current turn.
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Current round.
    pub const fn round(&self) -> u64 {
        self.round
    }

    /// Who submitted the command being handled.
    pub const fn originator(&self) -> Originator {
        self.originator
    }

    /// Schedule a follow-up command for the same originator, `delay` turns
    /// from now. A zero delay is still evaluated no earlier than the next
    /// admission pass.
    pub fn schedule(&mut self, text: impl Into<String>, delay: u64, flags: EventFlags) -> EventId {
        let ready = ReadyTurn::At(self.turn.saturating_add(delay));
        self.push(Event::new(self.originator, text, ready, self.turn).with_flags(flags))
    }

    /// Schedule a follow-up that bypasses the one-per-turn budget.
    pub fn schedule_immediate(&mut self, text: impl Into<String>, flags: EventFlags) -> EventId {
        self.push(
            Event::new(self.originator, text, ReadyTurn::Immediate, self.turn).with_flags(flags),
        )
    }

    /// Queue a system notice for the miscellaneous drain.
    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn push(&mut self, event: Event) -> EventId {
        let id = event.id;
        self.scheduled.push(event);
        id
    }

    /// Split the context into the follow-up events and notices it collected.
    pub fn into_parts(self) -> (Vec<Event>, Vec<Notice>) {
        (self.scheduled, self.notices)
    }
}

/// The gameplay command interpreter.
pub trait CommandInterpreter: Send {
    /// Execute `command`. Called synchronously while the world lock is held.
    fn dispatch(
        &mut self,
        command: &Command<'_>,
        ctx: &mut DispatchContext,
    ) -> Result<DispatchOutcome, DispatchError>;
}

/// Interpreter that recognizes nothing. Every command is logged as not
/// understood.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInterpreter;

impl CommandInterpreter for NullInterpreter {
    fn dispatch(
        &mut self,
        _command: &Command<'_>,
        _ctx: &mut DispatchContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        Ok(DispatchOutcome::NotUnderstood)
    }
}

/// How one dispatch attempt ended, from the scheduler's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The text was blank; nothing was called.
    Empty,
    /// The interpreter handled the command.
    Handled,
    /// The interpreter did not recognize the verb.
    NotUnderstood {
        /// The unrecognized verb.
        verb: String,
    },
    /// The originator vanished; the event was dropped.
    ActorMissing,
    /// The interpreter returned an error.
    Failed,
    /// The interpreter panicked.
    Panicked,
}

/// Parse `event` and run it through `interpreter` with fault isolation.
///
/// Returns the outcome plus whatever follow-ups and notices the handler
/// produced. A panicking handler produces none.
pub fn invoke(
    interpreter: &mut dyn CommandInterpreter,
    event: &Event,
    turn: u64,
    round: u64,
) -> (Invocation, Vec<Event>, Vec<Notice>) {
    let Some((verb, rest)) = parse_command(&event.text) else {
        return (Invocation::Empty, Vec::new(), Vec::new());
    };
    let command = Command {
        verb,
        rest,
        originator: event.originator,
        flags: event.flags,
        event_id: event.id,
    };
    let mut ctx = DispatchContext::new(turn, round, event.originator);

    let result = catch_unwind(AssertUnwindSafe(|| interpreter.dispatch(&command, &mut ctx)));

    let invocation = match result {
        Ok(Ok(DispatchOutcome::Handled)) => Invocation::Handled,
        Ok(Ok(DispatchOutcome::NotUnderstood)) => {
            tracing::info!(
                event_id = %event.id,
                originator = %event.originator,
                verb = %command.verb,
                text = %event.text,
                "command not understood"
            );
            Invocation::NotUnderstood {
                verb: command.verb.clone(),
            }
        }
        Ok(Err(DispatchError::ActorMissing { originator })) => {
            tracing::warn!(
                event_id = %event.id,
                %originator,
                "actor vanished before dispatch, dropping event"
            );
            Invocation::ActorMissing
        }
        Ok(Err(err)) => {
            tracing::error!(
                event_id = %event.id,
                originator = %event.originator,
                error = %err,
                "command handler failed"
            );
            Invocation::Failed
        }
        Err(_) => {
            tracing::error!(
                event_id = %event.id,
                originator = %event.originator,
                turn,
                "command handler panicked"
            );
            return (Invocation::Panicked, Vec::new(), Vec::new());
        }
    };

    let (scheduled, notices) = ctx.into_parts();
    (invocation, scheduled, notices)
}

/// Counts of unrecognized verbs, for abuse and frequency tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BadInputTracker {
    counts: BTreeMap<String, u64>,
    total: u64,
}

impl BadInputTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one unrecognized `verb`.
    pub fn record(&mut self, verb: &str) {
        let count = self.counts.entry(verb.to_owned()).or_insert(0);
        *count = count.saturating_add(1);
        self.total = self.total.saturating_add(1);
    }

    /// Count for one verb.
    pub fn count(&self, verb: &str) -> u64 {
        self.counts.get(verb).copied().unwrap_or(0)
    }

    /// Total unrecognized commands.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// The `limit` most frequent verbs, most frequent first; ties by verb.
    pub fn top(&self, limit: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> =
            self.counts.iter().map(|(v, c)| (v.clone(), *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }
}

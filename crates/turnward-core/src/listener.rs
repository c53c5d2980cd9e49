//! Listener chains that may veto an event before it is handled.
//!
//! Listeners are registered per [`EventKind`] and run in chain order. The
//! first listener to return [`Verdict::Handled`] stops the chain and the
//! event is skipped without further side effects. A listener that panics
//! is logged and treated as [`Verdict::Continue`].

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use turnward_types::{EventKind, WorldEvent};

/// A listener's decision about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Let the next listener (or the handler) see the event.
    Continue,
    /// The event was handled here; suppress further processing.
    Handled,
}

/// Something that inspects events before they are handled.
pub trait EventListener: Send {
    /// Inspect `event` and decide whether processing continues.
    fn on_event(&mut self, event: &WorldEvent) -> Verdict;
}

impl<F> EventListener for F
where
    F: FnMut(&WorldEvent) -> Verdict + Send,
{
    fn on_event(&mut self, event: &WorldEvent) -> Verdict {
        self(event)
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Where in the chain a new listener goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Run before every listener already registered.
    Front,
    /// Run after every listener already registered.
    Back,
}

struct Entry {
    id: ListenerId,
    listener: Box<dyn EventListener>,
}

/// Per-kind ordered listener chains.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    chains: BTreeMap<EventKind, Vec<Entry>>,
}

impl core::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let counts: BTreeMap<EventKind, usize> =
            self.chains.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ListenerRegistry")
            .field("chains", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn register(
        &mut self,
        kind: EventKind,
        placement: Placement,
        listener: impl EventListener + 'static,
    ) -> ListenerId {
        self.next_id = self.next_id.saturating_add(1);
        let id = ListenerId(self.next_id);
        let entry = Entry {
            id,
            listener: Box::new(listener),
        };
        let chain = self.chains.entry(kind).or_default();
        match placement {
            Placement::Front => chain.insert(0, entry),
            Placement::Back => chain.push(entry),
        }
        tracing::debug!(?kind, ?placement, listener_id = id.0, "listener registered");
        id
    }

    /// Remove a listener. Returns whether it was found.
    pub fn unregister(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(chain) = self.chains.get_mut(&kind) else {
            return false;
        };
        let before = chain.len();
        chain.retain(|e| e.id != id);
        chain.len() != before
    }

    /// Run the chain for `event`. Returns [`Verdict::Handled`] if any
    /// listener vetoed it.
    pub fn run(&mut self, event: &WorldEvent) -> Verdict {
        let Some(chain) = self.chains.get_mut(&event.kind()) else {
            return Verdict::Continue;
        };
        for entry in chain.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| entry.listener.on_event(event))) {
                Ok(Verdict::Handled) => return Verdict::Handled,
                Ok(Verdict::Continue) => {}
                Err(_) => {
                    tracing::error!(
                        kind = ?event.kind(),
                        listener_id = entry.id.0,
                        "listener panicked, continuing chain"
                    );
                }
            }
        }
        Verdict::Continue
    }

    /// Number of listeners registered for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.chains.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use turnward_types::{Event, Notice, Originator, ReadyTurn, UserId};

    use super::*;

    fn input(text: &str) -> WorldEvent {
        WorldEvent::Input(Event::new(
            Originator::User(UserId(1)),
            text,
            ReadyTurn::At(0),
            0,
        ))
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str, verdict: Verdict) -> impl EventListener + 'static {
        let log = Arc::clone(log);
        move |_: &WorldEvent| {
            if let Ok(mut l) = log.lock() {
                l.push(name);
            }
            verdict
        }
    }

    fn entries(log: &Log) -> Vec<&'static str> {
        log.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[test]
    fn front_placement_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        let a = recorder(&log, "a", Verdict::Continue);
        let b = recorder(&log, "b", Verdict::Continue);
        let first = recorder(&log, "first", Verdict::Continue);
        reg.register(EventKind::Input, Placement::Back, a);
        reg.register(EventKind::Input, Placement::Back, b);
        reg.register(EventKind::Input, Placement::Front, first);

        assert_eq!(reg.run(&input("look")), Verdict::Continue);
        assert_eq!(entries(&log), vec!["first", "a", "b"]);
    }

    #[test]
    fn veto_short_circuits_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        let veto = recorder(&log, "veto", Verdict::Handled);
        let never = recorder(&log, "never", Verdict::Continue);
        reg.register(EventKind::Input, Placement::Back, veto);
        reg.register(EventKind::Input, Placement::Back, never);

        assert_eq!(reg.run(&input("look")), Verdict::Handled);
        assert_eq!(entries(&log), vec!["veto"]);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        reg.register(EventKind::Input, Placement::Back, |_: &WorldEvent| -> Verdict {
            panic!("listener bug")
        });
        let after = recorder(&log, "after", Verdict::Continue);
        reg.register(EventKind::Input, Placement::Back, after);

        assert_eq!(reg.run(&input("look")), Verdict::Continue);
        assert_eq!(reg.run(&input("look")), Verdict::Continue);
        assert_eq!(entries(&log), vec!["after", "after"]);
    }

    #[test]
    fn chains_are_keyed_by_kind() {
        let mut reg = ListenerRegistry::new();
        reg.register(EventKind::NewRound, Placement::Back, |_: &WorldEvent| Verdict::Handled);
        assert_eq!(reg.run(&input("look")), Verdict::Continue);
        let round = WorldEvent::Notice(Notice::NewRound { round: 1, turn: 40 });
        assert_eq!(reg.run(&round), Verdict::Handled);
    }

    #[test]
    fn unregister_removes_listener() {
        let mut reg = ListenerRegistry::new();
        let id = reg.register(EventKind::Input, Placement::Back, |_: &WorldEvent| Verdict::Handled);
        assert_eq!(reg.len(EventKind::Input), 1);
        assert!(reg.unregister(EventKind::Input, id));
        assert!(!reg.unregister(EventKind::Input, id));
        assert_eq!(reg.run(&input("look")), Verdict::Continue);
    }
}

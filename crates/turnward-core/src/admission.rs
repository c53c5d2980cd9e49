//! Per-turn event admission.
//!
//! [`run_admission`] drains the backlog once per turn and decides, for each
//! event, whether it runs now or waits:
//!
//! - Mob events run once their ready turn is reached.
//! - Immediate user events always run and do not use the actor's budget.
//! - Each user gets at most one non-immediate event per turn.
//! - A Block-flagged user event that is not ready yet suspends the actor's
//!   input until an Unblock-flagged event for that actor runs. Input the
//!   actor submitted after the suspension began is held back meanwhile.
//!
//! Anything that waits, and anything a handler schedules, goes to a side
//! list that is appended to the backlog only after the pass. An event is
//! therefore never looked at twice in one turn.

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use turnward_types::{Event, EventFlag, Originator, UserId, WorldEvent};

use crate::dispatch::{self, Invocation};
use crate::listener::Verdict;
use crate::macros::expand_macro;
use crate::services::Services;
use crate::suppression::{GateChange, InputGate};
use crate::world::World;

/// FIFO queue of events awaiting admission.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    queue: VecDeque<Event>,
}

impl Backlog {
    /// An empty backlog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Take the oldest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }
}

impl Extend<Event> for Backlog {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        self.queue.extend(iter);
    }
}

/// Counters for one admission pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionReport {
    /// Events popped from the backlog.
    pub examined: u64,
    /// Events handed to an interpreter (or expanded as a macro).
    pub dispatched: u64,
    /// Events returned to the backlog for a later turn.
    pub deferred: u64,
    /// Deferred events that were held by an input suppression.
    pub held: u64,
    /// Events a listener vetoed.
    pub vetoed: u64,
    /// Events dropped because their actor left the world.
    pub dropped: u64,
    /// Events created during the pass (follow-ups and macro expansions).
    pub spawned: u64,
}

enum Admitted {
    Dispatched,
    Vetoed,
}

/// Scratch state for one pass.
struct Pass {
    turn: u64,
    round: u64,
    processed: BTreeSet<UserId>,
    deferred: Vec<Event>,
    spawned: Vec<Event>,
    report: AdmissionReport,
}

impl Pass {
    fn defer(&mut self, event: Event) {
        self.report.deferred = self.report.deferred.saturating_add(1);
        self.deferred.push(event);
    }
}

/// Run one admission pass over the world's backlog at the current turn.
pub fn run_admission(world: &mut World, services: &mut Services) -> AdmissionReport {
    let mut pass = Pass {
        turn: world.clock.turn(),
        round: world.clock.round(),
        processed: BTreeSet::new(),
        deferred: Vec::new(),
        spawned: Vec::new(),
        report: AdmissionReport::default(),
    };

    while let Some(event) = world.backlog.pop() {
        pass.report.examined = pass.report.examined.saturating_add(1);
        match event.originator {
            Originator::Mob(_) => admit_mob(world, services, &mut pass, event),
            Originator::User(user) => admit_user(world, services, &mut pass, user, event),
        }
    }

    pass.report.spawned = u64::try_from(pass.spawned.len()).unwrap_or(u64::MAX);
    world.backlog.extend(pass.deferred);
    world.backlog.extend(pass.spawned);

    if pass.report.examined > 0 {
        tracing::debug!(
            turn = pass.turn,
            examined = pass.report.examined,
            dispatched = pass.report.dispatched,
            deferred = pass.report.deferred,
            held = pass.report.held,
            vetoed = pass.report.vetoed,
            dropped = pass.report.dropped,
            "admission pass complete"
        );
    }
    pass.report
}

fn admit_mob(world: &mut World, services: &mut Services, pass: &mut Pass, event: Event) {
    if !event.ready.is_ready(pass.turn) {
        pass.defer(event);
        return;
    }
    match admit(world, services, pass, event) {
        // Mobs have no per-turn budget.
        Admitted::Dispatched | Admitted::Vetoed => {}
    }
}

fn admit_user(
    world: &mut World,
    services: &mut Services,
    pass: &mut Pass,
    user: UserId,
    mut event: Event,
) {
    if !world.roster.contains(user) {
        tracing::warn!(
            event_id = %event.id,
            %user,
            text = %event.text,
            "user not in world, dropping event"
        );
        pass.report.dropped = pass.report.dropped.saturating_add(1);
        return;
    }

    if event.ready.is_immediate() {
        apply_unblock(world, services, user, &event);
        match admit(world, services, pass, event) {
            // Immediate events never use the per-user budget.
            Admitted::Dispatched | Admitted::Vetoed => {}
        }
        return;
    }

    if pass.processed.contains(&user) {
        pass.defer(event);
        return;
    }

    if !event.ready.is_ready(pass.turn) {
        if event.flags.remove(EventFlag::Block)
            && world.block_input(user) == GateChange::Changed
        {
            tracing::debug!(%user, turn = pass.turn, event_id = %event.id, "input suppressed");
            services.sessions.block_input(user);
        }
        pass.defer(event);
        return;
    }

    if let InputGate::AwaitingCompletion { since_turn } = world.gate(user) {
        if !event.flags.contains(EventFlag::Unblock) && event.created_turn >= since_turn {
            pass.report.held = pass.report.held.saturating_add(1);
            pass.defer(event);
            return;
        }
    }

    apply_unblock(world, services, user, &event);
    if matches!(admit(world, services, pass, event), Admitted::Dispatched) {
        pass.processed.insert(user);
    }
}

fn apply_unblock(world: &mut World, services: &mut Services, user: UserId, event: &Event) {
    if event.flags.contains(EventFlag::Unblock) && world.release_input(user) == GateChange::Changed
    {
        tracing::debug!(%user, event_id = %event.id, "input resumed");
        services.sessions.resume_input(user);
    }
}

/// Veto check, then macro expansion or interpreter dispatch.
fn admit(world: &mut World, services: &mut Services, pass: &mut Pass, event: Event) -> Admitted {
    let wrapped = WorldEvent::Input(event);
    if services.listeners.run(&wrapped) == Verdict::Handled {
        pass.report.vetoed = pass.report.vetoed.saturating_add(1);
        return Admitted::Vetoed;
    }
    let WorldEvent::Input(event) = wrapped else {
        return Admitted::Vetoed;
    };
    pass.report.dispatched = pass.report.dispatched.saturating_add(1);

    let interpreter = match event.originator {
        Originator::User(user) => {
            if let Some(record) = world.roster.get_mut(user) {
                if !event.text.trim().is_empty() {
                    record.last_input_round = pass.round;
                }
                if let Some(expanded) =
                    expand_macro(&record.profile.macros, &event.text, event.originator, pass.turn)
                {
                    tracing::debug!(
                        %user,
                        trigger = %event.text.trim(),
                        parts = expanded.len(),
                        "macro expanded"
                    );
                    pass.spawned.extend(expanded);
                    return Admitted::Dispatched;
                }
            }
            services.interpreter.as_mut()
        }
        Originator::Mob(_) => services.mob_interpreter.as_mut(),
    };

    tracing::trace!(
        event_id = %event.id,
        originator = %event.originator,
        turn = pass.turn,
        "dispatching"
    );
    let (outcome, scheduled, notices) =
        dispatch::invoke(interpreter, &event, pass.turn, pass.round);
    if let Invocation::NotUnderstood { verb } = &outcome {
        world.bad_input.record(verb);
    }
    pass.spawned.extend(scheduled);
    for notice in notices {
        world.notify(notice);
    }
    Admitted::Dispatched
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use turnward_types::{EventFlags, MobId, ReadyTurn};

    use super::*;
    use crate::config::ServerConfig;
    use crate::suppression::InputGates;
    use crate::testkit::{Recorder, SessionCall, add_user, services_with};

    fn world() -> World {
        World::new(Arc::new(ServerConfig::default()), InputGates::new())
    }

    /// Advance one turn and run a pass.
    fn tick(world: &mut World, services: &mut Services) -> AdmissionReport {
        world.clock.advance(40).unwrap();
        run_admission(world, services)
    }

    fn user_event(user: u64, text: &str, ready: ReadyTurn, created: u64) -> Event {
        Event::new(Originator::User(UserId(user)), text, ready, created)
    }

    #[test]
    fn never_dispatches_before_ready_turn() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(user_event(1, "late", ReadyTurn::At(5), 0));

        for _ in 0..4 {
            tick(&mut world, &mut services);
            assert!(rec.dispatched().is_empty(), "ran at turn {}", world.clock.turn());
        }
        tick(&mut world, &mut services);
        assert_eq!(rec.dispatched_at(), vec![("late".to_owned(), 5)]);
    }

    #[test]
    fn one_non_immediate_event_per_user_per_turn() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        for text in ["a", "b", "c"] {
            world.enqueue(user_event(1, text, ReadyTurn::At(0), 0));
        }

        let report = tick(&mut world, &mut services);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.deferred, 2);
        tick(&mut world, &mut services);
        tick(&mut world, &mut services);
        assert_eq!(
            rec.dispatched_at(),
            vec![("a".to_owned(), 1), ("b".to_owned(), 2), ("c".to_owned(), 3)]
        );
    }

    #[test]
    fn immediate_events_bypass_the_budget() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(user_event(1, "normal", ReadyTurn::At(0), 0));
        world.enqueue(user_event(1, "now1", ReadyTurn::Immediate, 0));
        world.enqueue(user_event(1, "now2", ReadyTurn::Immediate, 0));

        let report = tick(&mut world, &mut services);
        assert_eq!(report.dispatched, 3);
        assert_eq!(rec.dispatched(), vec!["normal", "now1", "now2"]);
    }

    #[test]
    fn distinct_users_both_dispatch_in_same_turn() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        add_user(&mut world, 2);
        world.enqueue(user_event(1, "one", ReadyTurn::At(0), 0));
        world.enqueue(user_event(2, "two", ReadyTurn::At(0), 0));

        let report = tick(&mut world, &mut services);
        assert_eq!(report.dispatched, 2);
        assert_eq!(rec.dispatched_at(), vec![("one".to_owned(), 1), ("two".to_owned(), 1)]);
    }

    #[test]
    fn follow_ups_are_not_evaluated_in_the_creating_pass() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        world.enqueue(Event::new(Originator::Mob(MobId(9)), "followup", ReadyTurn::At(0), 0));

        // The recorder answers "followup" by scheduling "done" with zero
        // delay; it must still wait for the next pass.
        let report = tick(&mut world, &mut services);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.spawned, 1);
        assert_eq!(world.backlog.len(), 1);
        tick(&mut world, &mut services);
        assert_eq!(
            rec.dispatched_at(),
            vec![("followup".to_owned(), 1), ("done".to_owned(), 2)]
        );
    }

    #[test]
    fn deferred_events_keep_per_user_order() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        add_user(&mut world, 2);
        for i in 0..4 {
            world.enqueue(user_event(1, &format!("u1-{i}"), ReadyTurn::At(0), 0));
            world.enqueue(user_event(2, &format!("u2-{i}"), ReadyTurn::At(0), 0));
        }
        for _ in 0..4 {
            tick(&mut world, &mut services);
        }
        let order = rec.dispatched();
        let u1: Vec<&String> = order.iter().filter(|t| t.starts_with("u1")).collect();
        assert_eq!(u1, vec!["u1-0", "u1-1", "u1-2", "u1-3"]);
        assert!(world.backlog.is_empty());
    }

    #[test]
    fn blocking_holds_input_until_completion() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        for _ in 0..9 {
            tick(&mut world, &mut services);
        }

        // Turn 10: the completion of a multi-turn action, due at 13.
        world.clock.advance(40).unwrap();
        world.enqueue(
            user_event(1, "complete", ReadyTurn::At(13), 10)
                .with_flags(EventFlags::BLOCK_UNTIL_COMPLETE),
        );
        run_admission(&mut world, &mut services);
        assert!(matches!(world.gate(UserId(1)), InputGate::AwaitingCompletion { since_turn: 10 }));
        assert_eq!(rec.sessions(), vec![SessionCall::Block(UserId(1))]);

        // Turns 11 and 12: ordinary input arrives and is held.
        for turn in 11..=12 {
            world.clock.advance(40).unwrap();
            world.enqueue(user_event(1, &format!("cmd{turn}"), ReadyTurn::At(turn), turn));
            run_admission(&mut world, &mut services);
        }
        assert!(rec.dispatched().is_empty());

        // Turn 13: the completion runs first and lifts the suppression.
        tick(&mut world, &mut services);
        assert_eq!(rec.dispatched_at(), vec![("complete".to_owned(), 13)]);
        assert_eq!(world.gate(UserId(1)), InputGate::Free);
        assert_eq!(
            rec.sessions(),
            vec![SessionCall::Block(UserId(1)), SessionCall::Resume(UserId(1))]
        );

        // Held input drains one per turn afterwards.
        tick(&mut world, &mut services);
        world.enqueue(user_event(1, "cmd15", ReadyTurn::At(15), 15));
        tick(&mut world, &mut services);
        tick(&mut world, &mut services);
        assert_eq!(
            rec.dispatched_at(),
            vec![
                ("complete".to_owned(), 13),
                ("cmd11".to_owned(), 14),
                ("cmd12".to_owned(), 15),
                ("cmd15".to_owned(), 16),
            ]
        );
    }

    #[test]
    fn block_flag_is_stripped_once_applied() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(
            user_event(1, "complete", ReadyTurn::At(3), 0)
                .with_flags(EventFlags::BLOCK_UNTIL_COMPLETE),
        );
        tick(&mut world, &mut services);
        let queued = world.backlog.iter().next().unwrap();
        assert!(!queued.flags.contains(EventFlag::Block));
        assert!(queued.flags.contains(EventFlag::Unblock));
    }

    #[test]
    fn queued_input_from_before_the_block_is_not_held() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world.clock.advance(40).unwrap();
        world.block_input(UserId(1));
        world.clock.advance(40).unwrap();
        world.enqueue(user_event(1, "old", ReadyTurn::At(0), 0));
        run_admission(&mut world, &mut services);
        assert_eq!(rec.dispatched(), vec!["old"]);
    }

    #[test]
    fn veto_skips_dispatch_without_using_budget() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        services.listeners.register(
            turnward_types::EventKind::Input,
            crate::listener::Placement::Back,
            |e: &WorldEvent| match e {
                WorldEvent::Input(ev) if ev.text == "secret" => Verdict::Handled,
                _ => Verdict::Continue,
            },
        );
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(user_event(1, "secret", ReadyTurn::At(0), 0));
        world.enqueue(user_event(1, "look", ReadyTurn::At(0), 0));

        let report = tick(&mut world, &mut services);
        assert_eq!(report.vetoed, 1);
        assert_eq!(rec.dispatched_at(), vec![("look".to_owned(), 1)]);
    }

    #[test]
    fn panicking_listener_does_not_stall_the_pass() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        services.listeners.register(
            turnward_types::EventKind::Input,
            crate::listener::Placement::Back,
            |e: &WorldEvent| match e {
                WorldEvent::Input(ev) if ev.text == "boom" => panic!("listener bug"),
                _ => Verdict::Continue,
            },
        );
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(user_event(1, "boom", ReadyTurn::At(0), 0));
        world.enqueue(user_event(1, "look", ReadyTurn::At(0), 0));

        let report = tick(&mut world, &mut services);
        assert_eq!(report.vetoed, 0);
        tick(&mut world, &mut services);
        assert_eq!(
            rec.dispatched_at(),
            vec![("boom".to_owned(), 1), ("look".to_owned(), 2)]
        );
    }

    #[test]
    fn events_for_departed_users_are_dropped() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        world.enqueue(user_event(4, "look", ReadyTurn::At(0), 0));
        let report = tick(&mut world, &mut services);
        assert_eq!(report.dropped, 1);
        assert!(world.backlog.is_empty());
        assert!(rec.dispatched().is_empty());
    }

    #[test]
    fn macro_expands_into_one_event_per_turn() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world
            .roster
            .get_mut(UserId(1))
            .unwrap()
            .profile
            .macros
            .define("ab", "kick;punch");

        world.enqueue(user_event(1, "ab", ReadyTurn::At(0), 0));
        tick(&mut world, &mut services);
        assert!(rec.dispatched().is_empty());
        let readies: Vec<ReadyTurn> = world.backlog.iter().map(|e| e.ready).collect();
        assert_eq!(readies, vec![ReadyTurn::At(1), ReadyTurn::At(2)]);

        tick(&mut world, &mut services);
        tick(&mut world, &mut services);
        assert_eq!(
            rec.dispatched_at(),
            vec![("kick".to_owned(), 2), ("punch".to_owned(), 3)]
        );
    }

    #[test]
    fn unknown_verbs_are_counted() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        world.enqueue(user_event(1, "xyzzy now", ReadyTurn::At(0), 0));
        tick(&mut world, &mut services);
        assert_eq!(world.bad_input.count("xyzzy"), 1);
    }

    #[test]
    fn input_updates_last_input_round() {
        let rec = Recorder::new();
        let mut services = services_with(&rec);
        let mut world = world();
        add_user(&mut world, 1);
        for _ in 0..80 {
            world.clock.advance(40).unwrap();
        }
        world.enqueue(user_event(1, "look", ReadyTurn::At(0), 0));
        run_admission(&mut world, &mut services);
        assert_eq!(world.roster.get(UserId(1)).unwrap().last_input_round, 2);
    }
}

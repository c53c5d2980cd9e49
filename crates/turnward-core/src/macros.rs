//! Per-actor input macros.
//!
//! A macro maps a two-character trigger to a `;`-separated list of commands.
//! Expansion does not run anything inline: sub-command `i` becomes an event
//! ready at `turn + i`, so a macro goes through the same admission rules as
//! typed input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use turnward_types::{Event, Originator, ReadyTurn};

/// Number of characters in a macro trigger.
pub const TRIGGER_LEN: usize = 2;

/// Separator between sub-commands in a macro definition.
pub const SEPARATOR: char = ';';

/// An actor's trigger-to-definition map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroTable {
    entries: BTreeMap<String, String>,
}

impl MacroTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a macro. Returns `false` (and stores nothing) if
    /// the trigger is not exactly two characters.
    pub fn define(&mut self, trigger: &str, definition: impl Into<String>) -> bool {
        if trigger.chars().count() != TRIGGER_LEN {
            return false;
        }
        self.entries.insert(trigger.to_owned(), definition.into());
        true
    }

    /// Remove a macro.
    pub fn remove(&mut self, trigger: &str) -> Option<String> {
        self.entries.remove(trigger)
    }

    /// Look up the definition for `trigger`.
    pub fn get(&self, trigger: &str) -> Option<&str> {
        self.entries.get(trigger).map(String::as_str)
    }

    /// Whether the table has no macros.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MacroTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (k, v) in iter {
            let k = k.into();
            table.define(&k, v);
        }
        table
    }
}

/// Expand `text` if it is a macro trigger in `table`.
///
/// Returns `None` when `text` is not a trigger. Blank sub-commands are
/// skipped but still occupy their turn slot.
pub fn expand_macro(
    table: &MacroTable,
    text: &str,
    originator: Originator,
    turn: u64,
) -> Option<Vec<Event>> {
    let trigger = text.trim();
    if trigger.chars().count() != TRIGGER_LEN {
        return None;
    }
    let definition = table.get(trigger)?;

    let mut events = Vec::new();
    let mut wait: u64 = 0;
    for part in definition.split(SEPARATOR) {
        let part = part.trim();
        if !part.is_empty() {
            let ready = ReadyTurn::At(turn.saturating_add(wait));
            events.push(Event::new(originator, part, ready, turn));
        }
        wait = wait.saturating_add(1);
    }
    Some(events)
}

//! Sets of aliases whose external action has already been applied.

use std::collections::BTreeSet;

/// Aliases for which the last external action succeeded.
///
/// An alias is inserted only after its create/attach call succeeded and
/// removed once the matching teardown ran, so a replayed SET on a tracked
/// alias never re-issues the external call.
#[derive(Debug, Clone, Default)]
pub struct TrackingSet {
    name: &'static str,
    aliases: BTreeSet<String>,
}

impl TrackingSet {
    /// Creates an empty set; `name` appears in dumps.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            aliases: BTreeSet::new(),
        }
    }

    /// Returns the set name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the alias is tracked.
    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }

    /// Tracks an alias. Returns false if it was already tracked.
    pub fn insert(&mut self, alias: impl Into<String>) -> bool {
        self.aliases.insert(alias.into())
    }

    /// Untracks an alias. Returns false if it was not tracked.
    pub fn remove(&mut self, alias: &str) -> bool {
        self.aliases.remove(alias)
    }

    /// Number of tracked aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Iterates tracked aliases in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(String::as_str)
    }
}

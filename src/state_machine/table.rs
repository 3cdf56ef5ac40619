use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::state::State;

/// Directed graph of allowed transitions: state → successor states.
///
/// Forced states are not stored here; the machine checks them separately.
/// Successor sets are ordered, so every query is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<State, BTreeSet<State>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, from: State, to: State) {
        self.edges.entry(from).or_default().insert(to);
    }

    /// Removes the edge if present. Returns whether anything was removed.
    pub fn remove(&mut self, from: State, to: State) -> bool {
        self.edges
            .get_mut(&from)
            .map(|targets| targets.remove(&to))
            .unwrap_or(false)
    }

    pub fn allows(&self, from: State, to: State) -> bool {
        self.edges
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    pub fn successors(&self, from: State) -> impl Iterator<Item = State> + '_ {
        self.edges.get(&from).into_iter().flatten().copied()
    }

    pub fn successor_count(&self, from: State) -> usize {
        self.edges.get(&from).map_or(0, BTreeSet::len)
    }

    /// The successor of `from` when there is exactly one.
    pub fn sole_successor(&self, from: State) -> Option<State> {
        let mut successors = self.successors(from);
        match (successors.next(), successors.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.edges.values().all(BTreeSet::is_empty)
    }
}

impl fmt::Display for TransitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (from, targets) in &self.edges {
            if targets.is_empty() {
                continue;
            }
            let targets: Vec<&str> = targets.iter().map(|s| s.as_str()).collect();
            writeln!(f, "{from} -> {}", targets.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query_edges() {
        let mut table = TransitionTable::new();
        table.add(State::Running, State::Check);
        table.add(State::Check, State::PullManifest);

        assert!(table.allows(State::Running, State::Check));
        assert!(!table.allows(State::Check, State::Running));
        assert!(!table.allows(State::Finished, State::Running));
    }

    #[test]
    fn sole_successor_requires_exactly_one() {
        let mut table = TransitionTable::new();
        assert_eq!(table.sole_successor(State::PullManifest), None);

        table.add(State::PullManifest, State::TransferBlob);
        assert_eq!(
            table.sole_successor(State::PullManifest),
            Some(State::TransferBlob)
        );

        table.add(State::PullManifest, State::Finished);
        assert_eq!(table.sole_successor(State::PullManifest), None);
        assert_eq!(table.successor_count(State::PullManifest), 2);
    }

    #[test]
    fn adding_same_edge_twice_is_idempotent() {
        let mut table = TransitionTable::new();
        table.add(State::Delete, State::Finished);
        table.add(State::Delete, State::Finished);
        assert_eq!(table.sole_successor(State::Delete), Some(State::Finished));
    }

    #[test]
    fn remove_edge() {
        let mut table = TransitionTable::new();
        table.add(State::PullManifest, State::TransferBlob);
        table.add(State::PullManifest, State::Finished);

        assert!(table.remove(State::PullManifest, State::Finished));
        assert!(!table.remove(State::PullManifest, State::Finished));
        assert!(!table.remove(State::Check, State::Finished));
        assert_eq!(
            table.sole_successor(State::PullManifest),
            Some(State::TransferBlob)
        );

        table.remove(State::PullManifest, State::TransferBlob);
        assert!(table.is_empty());
    }

    #[test]
    fn display_lists_edges_in_order() {
        let mut table = TransitionTable::new();
        table.add(State::Running, State::Delete);
        table.add(State::Delete, State::Finished);
        table.add(State::Pending, State::Running);

        assert_eq!(
            table.to_string(),
            "pending -> running\nrunning -> delete\ndelete -> finished\n"
        );
    }
}

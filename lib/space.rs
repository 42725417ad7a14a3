//! Registry assigning stable row indices to basis states.

use std::ops::Deref;
use indexmap::IndexSet;
use crate::state::BasisState;

/// Bidirectional map between states and canonical coordinate indices.
///
/// Indices are handed out in insertion order and never reassigned; lookups in
/// both directions are O(1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSpace<S>
where S: BasisState
{
    states: IndexSet<S>,
}

impl<S> Default for StateSpace<S>
where S: BasisState
{
    fn default() -> Self { Self { states: IndexSet::new() } }
}

impl<S> Deref for StateSpace<S>
where S: BasisState
{
    type Target = IndexSet<S>;

    fn deref(&self) -> &Self::Target { &self.states }
}

impl<S> FromIterator<S> for StateSpace<S>
where S: BasisState
{
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = S>
    {
        let mut space = Self::default();
        iter.into_iter().for_each(|s| { space.insert(s); });
        space
    }
}

impl<S> StateSpace<S>
where S: BasisState
{
    pub fn new() -> Self { Self::default() }

    /// Register a state, returning its index and whether it was newly added.
    pub fn insert(&mut self, state: S) -> (usize, bool) {
        let expected = self.states.len();
        let (idx, added) = self.states.insert_full(state);
        debug_assert!(
            (added && idx == expected) || (!added && idx < expected),
            "StateSpace::insert: index assignment out of order",
        );
        (idx, added)
    }

    /// Return the index of a state, if registered.
    pub fn index_of(&self, state: &S) -> Option<usize> {
        self.states.get_index_of(state)
    }

    /// Return the state at an index.
    pub fn state(&self, idx: usize) -> Option<&S> { self.states.get_index(idx) }

    /// Return all indices whose states are selected by `pattern`.
    pub fn find_matching(&self, pattern: &S::Pattern) -> Vec<usize> {
        self.states.iter()
            .enumerate()
            .filter_map(|(k, s)| s.matches(pattern).then_some(k))
            .collect()
    }

    /// Return a copy of the registered states in index order.
    pub fn to_vec(&self) -> Vec<S> { self.states.iter().cloned().collect() }

    pub fn clear(&mut self) { self.states.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ StateOne, StatePattern };

    #[test]
    fn stable_indices() {
        let mut space: StateSpace<StateOne> = StateSpace::new();
        let a = StateOne::new("Rb", 10, 0, 0.5, 0.5);
        let b = StateOne::new("Rb", 10, 0, 0.5, -0.5);
        assert_eq!(space.insert(a.clone()), (0, true));
        assert_eq!(space.insert(b.clone()), (1, true));
        assert_eq!(space.insert(a.clone()), (0, false));
        assert_eq!(space.len(), 2);
        assert_eq!(space.index_of(&b), Some(1));
        assert_eq!(space.state(0), Some(&a));
        assert_eq!(space.find_matching(&StatePattern::new().m(-0.5)), vec![1]);
    }
}

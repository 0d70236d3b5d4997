use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use peso_pbes::PropVarInstantiation;

use crate::SearchStrategy;
use crate::SolveError;

/// The frontier of the instantiation: discovered propositional variable
/// instantiations that have not been expanded yet. The active part is an
/// ordered deque; the irrelevant side set holds elements that pruning moved
/// out of the way. Reinserting an element moves it back to the active part.
#[derive(Default, Debug)]
pub struct Todo {
    active: VecDeque<PropVarInstantiation>,
    irrelevant: FxHashSet<PropVarInstantiation>,
}

impl Todo {
    /// Returns true iff both the active and the irrelevant part are empty.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.irrelevant.is_empty()
    }

    /// Returns true iff there is an active element to expand.
    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active(&self) -> &VecDeque<PropVarInstantiation> {
        &self.active
    }

    pub fn irrelevant(&self) -> &FxHashSet<PropVarInstantiation> {
        &self.irrelevant
    }

    /// Removes and returns the next active element: the oldest one for a
    /// breadth first search, the newest one for a depth first search.
    pub fn next(&mut self, strategy: SearchStrategy) -> Option<PropVarInstantiation> {
        match strategy {
            SearchStrategy::BreadthFirst => self.active.pop_front(),
            SearchStrategy::DepthFirst => self.active.pop_back(),
        }
    }

    /// Inserts a single element, moving it out of the irrelevant set if it
    /// was there.
    pub fn insert(&mut self, x: PropVarInstantiation) {
        self.irrelevant.remove(&x);
        self.active.push_back(x);
    }

    /// Inserts the given occurrences: irrelevant elements move back to the
    /// active part, undiscovered elements are appended.
    pub fn insert_discovered(
        &mut self,
        occurrences: impl IntoIterator<Item = PropVarInstantiation>,
        discovered: &DiscoveredSet,
    ) {
        for x in occurrences {
            if self.irrelevant.remove(&x) {
                self.active.push_back(x);
            } else if !discovered.contains(&x) {
                self.active.push_back(x);
            }
        }
    }

    /// Removes the given element from the irrelevant set, if present.
    pub fn remove_irrelevant(&mut self, x: &PropVarInstantiation) {
        self.irrelevant.remove(x);
    }

    /// Replaces the active part; everything currently in the todo that is
    /// not in the new active part becomes irrelevant. The total number of
    /// elements must be preserved.
    pub fn set_todo(&mut self, new_active: VecDeque<PropVarInstantiation>) -> Result<(), SolveError> {
        let size_before = self.active.len() + self.irrelevant.len();

        let keep: FxHashSet<&PropVarInstantiation> = new_active.iter().collect();
        let mut new_irrelevant = FxHashSet::default();
        for x in self.active.drain(..) {
            if !keep.contains(&x) {
                new_irrelevant.insert(x);
            }
        }
        for x in self.irrelevant.drain() {
            if !keep.contains(&x) {
                new_irrelevant.insert(x);
            }
        }

        self.active = new_active;
        self.irrelevant = new_irrelevant;

        let size_after = self.active.len() + self.irrelevant.len();
        if size_before != size_after {
            return Err(SolveError::InternalInconsistency(
                "sizes do not match while replacing the todo list".to_string(),
            ));
        }
        Ok(())
    }
}

/// The set of propositional variable instantiations that have been
/// discovered so far, with a stable insertion index. All mutation happens
/// under the todo lock, so the set needs no internal locking.
#[derive(Default, Debug)]
pub struct DiscoveredSet {
    index: FxHashMap<PropVarInstantiation, usize>,
    order: Vec<PropVarInstantiation>,
}

impl DiscoveredSet {
    /// Inserts the given element; returns its index and whether it was new.
    pub fn insert(&mut self, x: PropVarInstantiation) -> (usize, bool) {
        if let Some(index) = self.index.get(&x) {
            return (*index, false);
        }
        let index = self.order.len();
        self.index.insert(x.clone(), index);
        self.order.push(x);
        (index, true)
    }

    pub fn contains(&self, x: &PropVarInstantiation) -> bool {
        self.index.contains_key(x)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates over the elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PropVarInstantiation> {
        self.order.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(name: &str) -> PropVarInstantiation {
        PropVarInstantiation::new(name, [])
    }

    #[test]
    fn test_search_strategies() {
        let mut todo = Todo::default();
        todo.insert(x("A"));
        todo.insert(x("B"));
        assert_eq!(todo.next(SearchStrategy::BreadthFirst), Some(x("A")));

        todo.insert(x("C"));
        assert_eq!(todo.next(SearchStrategy::DepthFirst), Some(x("C")));
        assert_eq!(todo.next(SearchStrategy::DepthFirst), Some(x("B")));
        assert_eq!(todo.next(SearchStrategy::BreadthFirst), None);
    }

    #[test]
    fn test_insert_discovered_skips_known_elements() {
        let mut todo = Todo::default();
        let mut discovered = DiscoveredSet::default();
        discovered.insert(x("A"));

        todo.insert_discovered([x("A"), x("B")], &discovered);
        assert_eq!(todo.active().len(), 1);
        assert_eq!(todo.active()[0], x("B"));
    }

    #[test]
    fn test_set_todo_moves_elements_to_irrelevant_and_back() {
        let mut todo = Todo::default();
        todo.insert(x("A"));
        todo.insert(x("B"));
        todo.insert(x("C"));

        todo.set_todo(VecDeque::from([x("B")])).unwrap();
        assert_eq!(todo.active().len(), 1);
        assert_eq!(todo.irrelevant().len(), 2);
        assert!(todo.irrelevant().contains(&x("A")));

        // Reinsertion moves an element from irrelevant back to active.
        let discovered = DiscoveredSet::default();
        todo.insert_discovered([x("A")], &discovered);
        assert_eq!(todo.active().len(), 2);
        assert!(!todo.irrelevant().contains(&x("A")));
    }

    #[test]
    fn test_discovered_set_indices_are_stable() {
        let mut discovered = DiscoveredSet::default();
        assert_eq!(discovered.insert(x("A")), (0, true));
        assert_eq!(discovered.insert(x("B")), (1, true));
        assert_eq!(discovered.insert(x("A")), (0, false));
        assert_eq!(discovered.len(), 2);
    }
}

use std::collections::VecDeque;
use std::fmt;

use bitvec::bitvec;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use itertools::Itertools;
use rustc_hash::FxHashSet;

use crate::Decoration;
use crate::StructureGraph;
use crate::VertexIndex;

/// A compact set of vertex indices: a bitset for O(1) membership plus a
/// vector of the members in insertion order. Equality is by bitset.
#[derive(Clone)]
pub struct VertexSet {
    vertices: Vec<VertexIndex>,
    include: BitVec<usize, Lsb0>,
}

impl VertexSet {
    /// Creates an empty set covering the indices 0..extent.
    pub fn new(extent: usize) -> Self {
        Self {
            vertices: Vec::new(),
            include: bitvec![usize, Lsb0; 0; extent],
        }
    }

    /// Creates a set covering 0..extent with the given members.
    pub fn with_vertices(extent: usize, members: impl IntoIterator<Item = VertexIndex>) -> Self {
        let mut result = Self::new(extent);
        for u in members {
            result.insert(u);
        }
        result
    }

    /// Grows the bitset to cover at least n indices, doubling its size.
    pub fn resize(&mut self, n: usize) {
        let mut extent = self.include.len().max(1024);
        while extent < n {
            extent *= 2;
        }
        if extent > self.include.len() {
            self.include.resize(extent, false);
        }
    }

    /// Truncates the bitset to cover exactly n indices. Members beyond the
    /// new extent are dropped.
    pub fn truncate(&mut self, n: usize) {
        if self.include.len() > n {
            self.vertices.retain(|u| u.value() < n);
            self.include = bitvec![usize, Lsb0; 0; n];
            for u in &self.vertices {
                self.include.set(u.value(), true);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, u: VertexIndex) -> bool {
        self.include[u.value()]
    }

    pub fn insert(&mut self, u: VertexIndex) {
        debug_assert!(u.value() < self.include.len(), "Vertex {} outside extent", u);
        if self.include[u.value()] {
            return;
        }
        self.vertices.push(u);
        self.include.set(u.value(), true);
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.include = bitvec![usize, Lsb0; 0; self.include.len()];
    }

    /// Returns the number of indices covered by the bitset.
    pub fn extent(&self) -> usize {
        self.include.len()
    }

    /// Returns the members in insertion order.
    pub fn vertices(&self) -> &[VertexIndex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = VertexIndex> + '_ {
        self.vertices.iter().copied()
    }

    pub fn include(&self) -> &BitVec<usize, Lsb0> {
        &self.include
    }
}

impl PartialEq for VertexSet {
    fn eq(&self, other: &Self) -> bool {
        self.include == other.include
    }
}

impl Eq for VertexSet {}

impl fmt::Debug for VertexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.vertices.iter().format(", "))
    }
}

/// Returns the union of both sets.
pub fn set_union(v: &VertexSet, w: &VertexSet) -> VertexSet {
    let mut result = v.clone();
    for u in w.iter() {
        result.insert(u);
    }
    result
}

/// Returns the members of v that are also in w.
pub fn set_intersection(v: &VertexSet, w: &VertexSet) -> VertexSet {
    let mut result = VertexSet::new(v.extent());
    for u in v.iter() {
        if w.contains(u) {
            result.insert(u);
        }
    }
    result
}

/// Returns the members of v that are not in w.
pub fn set_minus(v: &VertexSet, w: &VertexSet) -> VertexSet {
    let mut result = VertexSet::new(v.extent());
    for u in v.iter() {
        if !w.contains(u) {
            result.insert(u);
        }
    }
    result
}

/// Returns true iff v is a subset of w.
pub fn is_subset_of(v: &VertexSet, w: &VertexSet) -> bool {
    v.iter().all(|u| w.contains(u))
}

/// A double ended vertex set, used as the worklist of attractor computations.
/// Breadth first processing keeps counter examples short.
pub struct DequeVertexSet {
    vertices: VecDeque<VertexIndex>,
    include: BitVec<usize, Lsb0>,
}

impl DequeVertexSet {
    pub fn new(extent: usize) -> Self {
        Self {
            vertices: VecDeque::new(),
            include: bitvec![usize, Lsb0; 0; extent],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, u: VertexIndex) -> bool {
        self.include[u.value()]
    }

    pub fn insert(&mut self, u: VertexIndex) {
        debug_assert!(u.value() < self.include.len(), "Vertex {} outside extent", u);
        if self.include[u.value()] {
            return;
        }
        self.vertices.push_back(u);
        self.include.set(u.value(), true);
    }

    pub fn pop_front(&mut self) -> Option<VertexIndex> {
        let u = self.vertices.pop_front()?;
        self.include.set(u.value(), false);
        Some(u)
    }

    pub fn pop_back(&mut self) -> Option<VertexIndex> {
        let u = self.vertices.pop_back()?;
        self.include.set(u.value(), false);
        Some(u)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }
}

/// A sparse map from vertex indices to chosen successors that grows on
/// demand; unset entries are undefined.
#[derive(Clone, Default, Debug)]
pub struct StrategyVector {
    strategy: Vec<Option<VertexIndex>>,
}

impl StrategyVector {
    /// Returns the chosen successor for the given vertex, if any.
    pub fn get(&self, u: VertexIndex) -> Option<VertexIndex> {
        self.strategy.get(u.value()).copied().flatten()
    }

    /// Records the chosen successor for the given vertex.
    pub fn set(&mut self, u: VertexIndex, v: Option<VertexIndex>) {
        if u.value() >= self.strategy.len() {
            let mut extent = self.strategy.len().max(16);
            while extent <= u.value() {
                extent *= 2;
            }
            self.strategy.resize(extent, None);
        }
        self.strategy[u.value()] = v;
    }

    /// Truncates the map to cover exactly n vertices.
    pub fn truncate(&mut self, n: usize) {
        if self.strategy.len() > n {
            self.strategy.truncate(n);
        }
    }

    pub fn len(&self) -> usize {
        self.strategy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategy.iter().all(|entry| entry.is_none())
    }
}

/// Extracts the minimal sub-graph that contains every vertex reachable from
/// `init` under the strategies recorded in the graph: at a winning choice
/// point only the strategy edge is explored, everywhere else all successors.
pub fn extract_minimal_structure_graph(
    graph: &StructureGraph,
    init: VertexIndex,
    s0: &VertexSet,
    s1: &VertexSet,
) -> FxHashSet<VertexIndex> {
    let mut todo = vec![init];
    let mut done = FxHashSet::default();

    while let Some(u) = todo.pop() {
        if !done.insert(u) {
            continue;
        }
        let in_s0 = u.value() < s0.extent() && s0.contains(u);
        let in_s1 = u.value() < s1.extent() && s1.contains(u);

        if (in_s0 && graph.decoration(u) == Decoration::Disjunction)
            || (in_s1 && graph.decoration(u) == Decoration::Conjunction)
        {
            // Explore only the strategy edge.
            let v = graph.strategy(u).expect("winning choice points have a strategy");
            if !done.contains(&v) {
                todo.push(v);
            }
        } else {
            // Explore all outgoing edges.
            for v in graph.successors(u) {
                if !done.contains(&v) {
                    todo.push(v);
                }
            }
        }
    }

    done
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_set_insert_and_order() {
        let mut set = VertexSet::new(8);
        set.insert(VertexIndex::new(3));
        set.insert(VertexIndex::new(1));
        set.insert(VertexIndex::new(3));

        assert!(set.contains(VertexIndex::new(3)));
        assert!(!set.contains(VertexIndex::new(2)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.vertices(), &[VertexIndex::new(3), VertexIndex::new(1)]);
    }

    #[test]
    fn test_vertex_set_resize_doubles() {
        let mut set = VertexSet::new(0);
        set.resize(10);
        assert_eq!(set.extent(), 1024);
        set.resize(2000);
        assert_eq!(set.extent(), 2048);
    }

    #[test]
    fn test_vertex_set_truncate() {
        let mut set = VertexSet::new(2048);
        set.insert(VertexIndex::new(1));
        set.insert(VertexIndex::new(2000));
        set.truncate(16);

        assert_eq!(set.extent(), 16);
        assert_eq!(set.vertices(), &[VertexIndex::new(1)]);
        assert!(set.contains(VertexIndex::new(1)));
    }

    #[test]
    fn test_set_operations() {
        let v = VertexSet::with_vertices(8, [0, 1, 2].map(VertexIndex::new));
        let w = VertexSet::with_vertices(8, [2, 3].map(VertexIndex::new));

        assert_eq!(set_union(&v, &w).len(), 4);
        assert_eq!(set_intersection(&v, &w).vertices(), &[VertexIndex::new(2)]);
        assert_eq!(
            set_minus(&v, &w).vertices(),
            &[VertexIndex::new(0), VertexIndex::new(1)]
        );
        assert!(is_subset_of(&set_intersection(&v, &w), &w));
        assert!(!is_subset_of(&v, &w));
    }

    #[test]
    fn test_deque_vertex_set_orders() {
        let mut set = DequeVertexSet::new(8);
        set.insert(VertexIndex::new(1));
        set.insert(VertexIndex::new(2));
        set.insert(VertexIndex::new(1));

        assert_eq!(set.pop_front(), Some(VertexIndex::new(1)));
        assert_eq!(set.pop_back(), Some(VertexIndex::new(2)));
        assert_eq!(set.pop_front(), None);
    }

    #[test]
    fn test_strategy_vector_grows() {
        let mut tau = StrategyVector::default();
        assert_eq!(tau.get(VertexIndex::new(100)), None);

        tau.set(VertexIndex::new(100), Some(VertexIndex::new(7)));
        assert_eq!(tau.get(VertexIndex::new(100)), Some(VertexIndex::new(7)));

        tau.truncate(50);
        assert_eq!(tau.get(VertexIndex::new(100)), None);
    }
}

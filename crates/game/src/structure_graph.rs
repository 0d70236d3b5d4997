use std::fmt;
use std::ops::Deref;

use bitvec::bitvec;
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use itertools::Itertools;

use peso_pbes::PbesExpression;

/// The index of a vertex in a structure graph. Vertex identity is positional,
/// so indices are only stable between erasures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VertexIndex(usize);

impl VertexIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index, mostly used for indexing.
    pub fn value(&self) -> usize {
        self.0
    }
}

impl Deref for VertexIndex {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for VertexIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VertexIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The decoration of a structure graph vertex. `None` means unfinished: the
/// vertex has been allocated, but its defining equation has not been reported
/// yet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decoration {
    Disjunction,
    Conjunction,
    True,
    False,
    None,
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoration::Disjunction => write!(f, "disjunction"),
            Decoration::Conjunction => write!(f, "conjunction"),
            Decoration::True => write!(f, "true"),
            Decoration::False => write!(f, "false"),
            Decoration::None => write!(f, "none"),
        }
    }
}

/// A vertex of a structure graph.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub formula: PbesExpression,
    pub decoration: Decoration,
    pub rank: Option<usize>,
    pub predecessors: Vec<VertexIndex>,
    pub successors: Vec<VertexIndex>,
    pub strategy: Option<VertexIndex>,
}

impl Vertex {
    pub fn new(formula: PbesExpression, decoration: Decoration, rank: Option<usize>) -> Self {
        Self {
            formula,
            decoration,
            rank,
            predecessors: Vec::new(),
            successors: Vec::new(),
            strategy: None,
        }
    }

    /// Returns true iff the defining equation of this vertex has been
    /// reported, or the vertex is an internal connective or terminal.
    pub fn is_defined(&self) -> bool {
        self.decoration != Decoration::None || !self.successors.is_empty()
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vertex(formula = {}, decoration = {}, rank = {}, predecessors = [{}], successors = [{}], strategy = {})",
            self.formula,
            self.decoration,
            match self.rank {
                Some(rank) => rank.to_string(),
                None => "undefined".to_string(),
            },
            self.predecessors.iter().format(", "),
            self.successors.iter().format(", "),
            match self.strategy {
                Some(strategy) => strategy.to_string(),
                None => "undefined".to_string(),
            },
        )
    }
}

/// The parity game produced by instantiation: a vertex store indexed by
/// position together with an exclusion bitset for soft deletion. Logically
/// removed vertices are invisible to iteration and the filtered accessors,
/// but keep their index stable.
#[derive(Default)]
pub struct StructureGraph {
    vertices: Vec<Vertex>,
    initial_vertex: VertexIndex,
    exclude: BitVec<usize, Lsb0>,
}

impl StructureGraph {
    /// Returns the number of vertices, including excluded ones.
    pub fn extent(&self) -> usize {
        self.vertices.len()
    }

    pub fn initial_vertex(&self) -> VertexIndex {
        self.initial_vertex
    }

    pub(crate) fn set_initial_vertex(&mut self, vertex: VertexIndex) {
        self.initial_vertex = vertex;
    }

    /// Appends a vertex, which is initially visible.
    pub(crate) fn push_vertex(&mut self, vertex: Vertex) -> VertexIndex {
        self.vertices.push(vertex);
        self.exclude.push(false);
        VertexIndex::new(self.vertices.len() - 1)
    }

    pub(crate) fn replace_vertices(&mut self, vertices: Vec<Vertex>) {
        self.exclude = bitvec![usize, Lsb0; 0; vertices.len()];
        self.vertices = vertices;
    }

    pub fn vertex(&self, u: VertexIndex) -> &Vertex {
        &self.vertices[u.value()]
    }

    pub(crate) fn vertex_mut(&mut self, u: VertexIndex) -> &mut Vertex {
        &mut self.vertices[u.value()]
    }

    pub fn decoration(&self, u: VertexIndex) -> Decoration {
        self.vertices[u.value()].decoration
    }

    pub fn rank(&self, u: VertexIndex) -> Option<usize> {
        self.vertices[u.value()].rank
    }

    pub fn strategy(&self, u: VertexIndex) -> Option<VertexIndex> {
        self.vertices[u.value()].strategy
    }

    pub fn set_strategy(&mut self, u: VertexIndex, v: Option<VertexIndex>) {
        self.vertices[u.value()].strategy = v;
    }

    /// Returns true iff the vertex has not been excluded.
    pub fn contains(&self, u: VertexIndex) -> bool {
        !self.exclude[u.value()]
    }

    /// Iterates over all visible vertices.
    pub fn iter_vertices(&self) -> impl Iterator<Item = VertexIndex> + '_ {
        (0..self.vertices.len())
            .map(VertexIndex::new)
            .filter(|u| self.contains(*u))
    }

    /// Iterates over the visible successors of the given vertex.
    pub fn successors(&self, u: VertexIndex) -> impl Iterator<Item = VertexIndex> + '_ {
        self.vertices[u.value()]
            .successors
            .iter()
            .copied()
            .filter(|v| self.contains(*v))
    }

    /// Iterates over the visible predecessors of the given vertex.
    pub fn predecessors(&self, u: VertexIndex) -> impl Iterator<Item = VertexIndex> + '_ {
        self.vertices[u.value()]
            .predecessors
            .iter()
            .copied()
            .filter(|v| self.contains(*v))
    }

    /// Returns all successors of the given vertex, excluded ones included.
    pub fn all_successors(&self, u: VertexIndex) -> &[VertexIndex] {
        &self.vertices[u.value()].successors
    }

    /// Returns all predecessors of the given vertex, excluded ones included.
    pub fn all_predecessors(&self, u: VertexIndex) -> &[VertexIndex] {
        &self.vertices[u.value()].predecessors
    }

    /// Returns true iff every vertex is excluded.
    pub fn is_empty(&self) -> bool {
        self.exclude.all()
    }

    pub fn exclude(&self) -> &BitVec<usize, Lsb0> {
        &self.exclude
    }

    pub fn exclude_mut(&mut self) -> &mut BitVec<usize, Lsb0> {
        &mut self.exclude
    }
}

impl fmt::Display for StructureGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for u in self.iter_vertices() {
            writeln!(f, "{:4} {}", u.value(), self.vertex(u))?;
        }
        if self.is_empty() {
            writeln!(f, "empty")?;
        }
        Ok(())
    }
}

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use peso_pbes::PbesExpression;
use peso_pbes::PropVarInstantiation;

use crate::Decoration;
use crate::GraphError;
use crate::StructureGraph;
use crate::Vertex;
use crate::VertexIndex;
use crate::VertexSet;

/// Maps an expression to the decoration of the vertex representing it.
pub fn classify(expression: &PbesExpression) -> Result<Decoration, GraphError> {
    match expression {
        PbesExpression::True => Ok(Decoration::True),
        PbesExpression::False => Ok(Decoration::False),
        PbesExpression::Var(_) => Ok(Decoration::None),
        PbesExpression::And(_, _) => Ok(Decoration::Conjunction),
        PbesExpression::Or(_, _) => Ok(Decoration::Disjunction),
        _ => Err(GraphError::UnsupportedExpression(expression.to_string())),
    }
}

/// Incrementally constructs a structure graph. Vertices are interned by
/// their formula, edges are deduplicated on insertion.
#[derive(Default)]
pub struct StructureGraphBuilder {
    graph: StructureGraph,
    vertex_map: HashMap<PbesExpression, VertexIndex, FxBuildHasher>,
    initial_state: Option<PbesExpression>,
}

impl StructureGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &StructureGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut StructureGraph {
        &mut self.graph
    }

    /// Consumes the builder and returns the finished graph.
    pub fn into_graph(self) -> StructureGraph {
        self.graph
    }

    pub fn extent(&self) -> usize {
        self.graph.extent()
    }

    pub fn vertex(&self, u: VertexIndex) -> &Vertex {
        self.graph.vertex(u)
    }

    fn create_vertex(&mut self, x: PbesExpression) -> Result<VertexIndex, GraphError> {
        debug_assert!(!self.vertex_map.contains_key(&x), "Vertex already interned");

        let decoration = classify(&x)?;
        let index = self.graph.push_vertex(Vertex::new(x.clone(), decoration, None));
        self.vertex_map.insert(x, index);
        Ok(index)
    }

    /// Returns the vertex for the formula x, creating it when it is new.
    /// Does not overwrite an existing decoration or rank.
    pub fn insert_variable(&mut self, x: &PbesExpression) -> Result<VertexIndex, GraphError> {
        match self.vertex_map.get(x) {
            Some(index) => Ok(*index),
            None => self.create_vertex(x.clone()),
        }
    }

    /// Inserts the vertex for the equation x = psi with rank k. The
    /// decoration and rank are overwritten, predecessors and successors are
    /// left intact.
    pub fn insert_variable_with(
        &mut self,
        x: &PbesExpression,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<VertexIndex, GraphError> {
        let index = match self.vertex_map.get(x) {
            Some(index) => *index,
            None => self.create_vertex(x.clone())?,
        };
        let decoration = classify(psi)?;
        let vertex = self.graph.vertex_mut(index);
        vertex.decoration = decoration;
        vertex.rank = Some(k);
        Ok(index)
    }

    /// Returns the vertex for the formula x, creating it when it is new.
    pub fn insert_vertex(&mut self, x: &PbesExpression) -> Result<VertexIndex, GraphError> {
        match self.vertex_map.get(x) {
            Some(index) => Ok(*index),
            None => self.create_vertex(x.clone()),
        }
    }

    /// Inserts the edge u -> v; a duplicate edge is a no-op.
    pub fn insert_edge(&mut self, u: VertexIndex, v: VertexIndex) {
        if self.graph.vertex(u).successors.contains(&v) {
            return;
        }
        self.graph.vertex_mut(u).successors.push(v);
        self.graph.vertex_mut(v).predecessors.push(u);
    }

    pub fn set_initial_state(&mut self, x: &PropVarInstantiation) {
        self.initial_state = Some(PbesExpression::Var(x.clone()));
    }

    /// Returns the vertex of the initial state, if it has been created.
    pub fn initial_vertex(&self) -> Option<VertexIndex> {
        let initial_state = self.initial_state.as_ref()?;
        self.vertex_map.get(initial_state).copied()
    }

    /// Returns the vertex for the given formula, if it exists.
    pub fn find_vertex(&self, x: &PbesExpression) -> Option<VertexIndex> {
        self.vertex_map.get(x).copied()
    }

    /// Stores the initial vertex in the graph; call at the end.
    pub fn finalize(&mut self) -> Result<(), GraphError> {
        let initial_vertex = self.initial_vertex().ok_or_else(|| {
            GraphError::InternalInconsistency("the initial state has no vertex".to_string())
        })?;
        self.graph.set_initial_vertex(initial_vertex);
        Ok(())
    }

    /// Removes all vertices in U. The remaining vertices are renumbered by
    /// order; predecessor, successor and strategy fields are rewritten
    /// through the renumbering and the interning map is rebuilt.
    pub fn erase_vertices(&mut self, u_set: &VertexSet) -> Result<(), GraphError> {
        let extent = self.graph.extent();

        // Compute the new index for every surviving vertex.
        let mut index: Vec<Option<VertexIndex>> = Vec::with_capacity(extent);
        let mut count = 0;
        for u in 0..extent {
            if u_set.contains(VertexIndex::new(u)) {
                index.push(None);
            } else {
                index.push(Some(VertexIndex::new(count)));
                count += 1;
            }
        }

        let renumber = |indices: &[VertexIndex]| -> Result<Vec<VertexIndex>, GraphError> {
            indices
                .iter()
                .filter_map(|v| {
                    if v.value() >= extent {
                        return Some(Err(GraphError::InternalInconsistency(format!(
                            "dangling vertex reference {v} while erasing"
                        ))));
                    }
                    index[v.value()].map(Ok)
                })
                .collect()
        };

        let mut vertices = Vec::with_capacity(count);
        for u in 0..extent {
            if index[u].is_none() {
                continue;
            }
            let vertex = self.graph.vertex(VertexIndex::new(u));
            let mut vertex = vertex.clone();
            vertex.predecessors = renumber(&vertex.predecessors)?;
            vertex.successors = renumber(&vertex.successors)?;
            vertex.strategy = vertex.strategy.and_then(|s| index[s.value()]);
            vertices.push(vertex);
        }

        if let Some(new_initial) = index
            .get(self.graph.initial_vertex().value())
            .copied()
            .flatten()
        {
            self.graph.set_initial_vertex(new_initial);
        }
        self.graph.replace_vertices(vertices);

        // Recreate the interning map.
        self.vertex_map.clear();
        for u in 0..count {
            let formula = self.graph.vertex(VertexIndex::new(u)).formula.clone();
            self.vertex_map.insert(formula, VertexIndex::new(u));
        }
        Ok(())
    }
}

/// Constructs a structure graph from explicit vertices, used by tests and
/// random game generation. No formulas are interned.
#[derive(Default)]
pub struct ManualGraphBuilder {
    graph: StructureGraph,
}

impl ManualGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vertex, returns the index of the new vertex.
    pub fn insert_vertex(&mut self, decoration: Decoration, rank: Option<usize>) -> VertexIndex {
        self.graph
            .push_vertex(Vertex::new(PbesExpression::True, decoration, rank))
    }

    /// Inserts the edge u -> v; a duplicate edge is a no-op.
    pub fn insert_edge(&mut self, u: VertexIndex, v: VertexIndex) {
        if self.graph.vertex(u).successors.contains(&v) {
            return;
        }
        self.graph.vertex_mut(u).successors.push(v);
        self.graph.vertex_mut(v).predecessors.push(u);
    }

    pub fn set_initial_state(&mut self, u: VertexIndex) {
        self.graph.set_initial_vertex(u);
    }

    pub fn build(self) -> StructureGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use peso_pbes::parse_pbes;

    use super::*;

    fn instantiation(name: &str) -> PbesExpression {
        PbesExpression::Var(PropVarInstantiation::new(name, []))
    }

    #[test]
    fn test_interning_and_edge_dedup() {
        let mut builder = StructureGraphBuilder::new();
        let x = instantiation("X");
        let y = instantiation("Y");

        let u = builder.insert_variable(&x).unwrap();
        let v = builder.insert_variable(&y).unwrap();
        assert_eq!(builder.insert_variable(&x).unwrap(), u);

        builder.insert_edge(u, v);
        builder.insert_edge(u, v);
        assert_eq!(builder.graph().all_successors(u), &[v]);
        assert_eq!(builder.graph().all_predecessors(v), &[u]);
        assert_eq!(builder.find_vertex(&y), Some(v));
        assert_eq!(builder.find_vertex(&instantiation("Z")), None);
    }

    #[test]
    fn test_insert_variable_with_overwrites_decoration() {
        let mut builder = StructureGraphBuilder::new();
        let x = instantiation("X");
        let psi = PbesExpression::and(instantiation("Y"), instantiation("Z"));

        let u = builder.insert_variable(&x).unwrap();
        assert_eq!(builder.graph().decoration(u), Decoration::None);
        assert_eq!(builder.graph().rank(u), None);

        let u2 = builder.insert_variable_with(&x, &psi, 3).unwrap();
        assert_eq!(u, u2);
        assert_eq!(builder.graph().decoration(u), Decoration::Conjunction);
        assert_eq!(builder.graph().rank(u), Some(3));
    }

    #[test]
    fn test_classify_rejects_quantifiers() {
        let pbes = parse_pbes("pbes nu X = forall b: Bool. X; init X;").unwrap();
        assert!(matches!(
            classify(&pbes.equations[0].formula),
            Err(GraphError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_erase_vertices_compacts_and_renumbers() {
        let mut builder = StructureGraphBuilder::new();
        let x = instantiation("X");
        let y = instantiation("Y");
        let z = instantiation("Z");

        let u = builder.insert_variable(&x).unwrap();
        let v = builder.insert_variable(&y).unwrap();
        let w = builder.insert_variable(&z).unwrap();
        builder.insert_edge(u, v);
        builder.insert_edge(v, w);
        builder.insert_edge(w, w);
        builder.graph_mut().set_strategy(v, Some(w));
        builder.set_initial_state(&PropVarInstantiation::new("Y", []));

        // Remove the first vertex; Y and Z shift down by one.
        let mut removed = VertexSet::new(3);
        removed.insert(u);
        builder.erase_vertices(&removed).unwrap();
        builder.finalize().unwrap();

        let graph = builder.graph();
        assert_eq!(graph.extent(), 2);
        let new_v = builder.find_vertex(&y).unwrap();
        let new_w = builder.find_vertex(&z).unwrap();
        assert_eq!(new_v, VertexIndex::new(0));
        assert_eq!(new_w, VertexIndex::new(1));
        assert_eq!(graph.all_predecessors(new_v), &[]);
        assert_eq!(graph.all_successors(new_v), &[new_w]);
        assert_eq!(graph.strategy(new_v), Some(new_w));
        assert_eq!(graph.initial_vertex(), new_v);
    }
}

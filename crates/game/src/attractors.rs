use log::debug;

use crate::DequeVertexSet;
use crate::Player;
use crate::StrategyVector;
use crate::StructureGraph;
use crate::VertexIndex;
use crate::VertexSet;

/// Where an attractor computation records the chosen strategies.
pub enum StrategyRecording<'a> {
    /// Do not record strategies.
    None,
    /// Write into the strategy field of the graph vertices.
    Graph,
    /// Write into the graph vertices and into the per-player strategy map.
    GraphAndLocal(&'a mut [StrategyVector; 2]),
}

/// Returns true iff all visible successors of u are in A.
pub fn includes_successors(graph: &StructureGraph, u: VertexIndex, a: &VertexSet) -> bool {
    graph.successors(u).all(|v| a.contains(v))
}

/// Returns a visible successor of u that is in A, if one exists.
pub fn find_successor_in(graph: &StructureGraph, u: VertexIndex, a: &VertexSet) -> Option<VertexIndex> {
    let result = graph.successors(u).find(|v| a.contains(*v));
    if result.is_none() {
        debug!("No successor found for vertex {} in {:?}", u, a);
    }
    result
}

/// Returns pred(A) \ A as a worklist.
fn exclusive_predecessors(graph: &StructureGraph, a: &VertexSet) -> DequeVertexSet {
    let mut todo = DequeVertexSet::new(graph.extent());
    for u in a.iter() {
        for v in graph.predecessors(u) {
            if !a.contains(v) {
                todo.insert(v);
            }
        }
    }
    todo
}

/// Computes the alpha attractor towards A, extending A. The worklist is
/// processed breadth first to keep counter examples short. Strategies are
/// recorded on attracted vertices of decoration alpha, according to the
/// recording mode.
fn attr_default_generic(
    graph: &mut StructureGraph,
    mut a: VertexSet,
    alpha: Player,
    mut recording: StrategyRecording,
) -> VertexSet {
    let mut todo = exclusive_predecessors(graph, &a);

    while let Some(u) = todo.pop_front() {
        if graph.decoration(u) == alpha.decoration() || includes_successors(graph, u, &a) {
            if graph.decoration(u) == alpha.decoration() {
                let v = find_successor_in(graph, u, &a);
                match &mut recording {
                    StrategyRecording::None => {}
                    StrategyRecording::Graph => graph.set_strategy(u, v),
                    StrategyRecording::GraphAndLocal(tau) => {
                        graph.set_strategy(u, v);
                        tau[alpha.to_index()].set(u, v);
                    }
                }
            }
            a.insert(u);
            for v in graph.predecessors(u) {
                if !a.contains(v) {
                    todo.insert(v);
                }
            }
        }
    }

    a
}

/// Attractor computation that writes strategies into the graph vertices.
pub fn attr_default(graph: &mut StructureGraph, a: VertexSet, alpha: Player) -> VertexSet {
    attr_default_generic(graph, a, alpha, StrategyRecording::Graph)
}

/// Attractor computation without strategy recording.
pub fn attr_default_no_strategy(graph: &mut StructureGraph, a: VertexSet, alpha: Player) -> VertexSet {
    attr_default_generic(graph, a, alpha, StrategyRecording::None)
}

/// Attractor computation that writes strategies both into the graph vertices
/// and into the external per-player strategy map.
pub fn attr_default_with_tau(
    graph: &mut StructureGraph,
    a: VertexSet,
    alpha: Player,
    tau: &mut [StrategyVector; 2],
) -> VertexSet {
    attr_default_generic(graph, a, alpha, StrategyRecording::GraphAndLocal(tau))
}

#[cfg(test)]
mod tests {
    use crate::Decoration;
    use crate::ManualGraphBuilder;

    use super::*;

    /// Builds the graph 0 -> 1 -> 2, 0 -> 2, 3 -> 1 where 0 is disjunctive,
    /// 1 conjunctive, 2 disjunctive and 3 conjunctive.
    fn diamond() -> (StructureGraph, [VertexIndex; 4]) {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        let v1 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        let v2 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        let v3 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v2);
        builder.insert_edge(v0, v2);
        builder.insert_edge(v3, v1);
        (builder.build(), [v0, v1, v2, v3])
    }

    #[test]
    fn test_attractor_closure_property() {
        let (mut graph, [v0, v1, v2, v3]) = diamond();

        let target = VertexSet::with_vertices(graph.extent(), [v2]);
        let a = attr_default(&mut graph, target, Player::Even);

        // 0 can choose to move into the target, 1 has all successors inside,
        // and 3 is then forced into the attractor as well.
        assert!(a.contains(v0) && a.contains(v1) && a.contains(v2) && a.contains(v3));

        // Every attracted vertex either has a strategy into A or all of its
        // successors in A.
        for u in a.iter() {
            if graph.decoration(u) == Decoration::Disjunction {
                if u != v2 {
                    let v = graph.strategy(u).unwrap();
                    assert!(a.contains(v));
                }
            } else {
                assert!(includes_successors(&graph, u, &a));
            }
        }
    }

    #[test]
    fn test_attractor_opponent_escape() {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        let v1 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        let v2 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        let v3 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        let v4 = builder.insert_vertex(Decoration::Disjunction, Some(1));
        builder.insert_edge(v0, v1);
        builder.insert_edge(v0, v2);
        builder.insert_edge(v1, v2);
        builder.insert_edge(v1, v4);
        builder.insert_edge(v3, v1);
        builder.insert_edge(v4, v4);
        let mut graph = builder.build();

        let target = VertexSet::with_vertices(graph.extent(), [v2]);
        let a = attr_default_no_strategy(&mut graph, target, Player::Even);

        // 1 escapes through 4, so neither 1 nor its predecessor 3 is
        // attracted; 0 still chooses the direct edge into the target.
        assert!(a.contains(v0) && a.contains(v2));
        assert!(!a.contains(v1) && !a.contains(v3) && !a.contains(v4));
    }

    #[test]
    fn test_attractor_with_tau_records_both() {
        let (mut graph, [v0, _v1, v2, _v3]) = diamond();
        let mut tau = [StrategyVector::default(), StrategyVector::default()];

        let target = VertexSet::with_vertices(graph.extent(), [v2]);
        let a = attr_default_with_tau(&mut graph, target, Player::Even, &mut tau);

        assert!(a.contains(v0));
        assert_eq!(graph.strategy(v0), tau[0].get(v0));
        assert!(tau[1].get(v0).is_none());
    }
}

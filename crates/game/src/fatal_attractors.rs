use log::debug;

use crate::DequeVertexSet;
use crate::Player;
use crate::StrategyVector;
use crate::StructureGraph;
use crate::VertexIndex;
use crate::VertexSet;
use crate::attr_default_with_tau;
use crate::find_successor_in;
use crate::includes_successors;
use crate::set_union;

/// Returns true iff the rank of v is at least p. An undefined rank (internal
/// connective vertices) compares as infinity.
fn rank_at_least(graph: &StructureGraph, v: VertexIndex, p: usize) -> bool {
    graph.rank(v).is_none_or(|rank| rank >= p)
}

/// Computes the alpha attractor towards A restricted to vertices with rank
/// at least p, extending A. Strategies are recorded in the graph and in the
/// per-player strategy map.
pub fn attr_min_rank(
    graph: &mut StructureGraph,
    mut a: VertexSet,
    alpha: Player,
    p: usize,
    tau: &mut [StrategyVector; 2],
) -> VertexSet {
    let mut todo = DequeVertexSet::new(graph.extent());
    for v in a.iter() {
        for u in graph.predecessors(v) {
            if rank_at_least(graph, u, p) && !a.contains(u) {
                todo.insert(u);
            }
        }
    }

    while let Some(u) = todo.pop_front() {
        if graph.decoration(u) == alpha.decoration() || includes_successors(graph, u, &a) {
            if graph.decoration(u) == alpha.decoration() {
                let v = find_successor_in(graph, u, &a);
                graph.set_strategy(u, v);
                tau[alpha.to_index()].set(u, v);
            }
            a.insert(u);

            for v in graph.predecessors(u) {
                if rank_at_least(graph, v, p) && !a.contains(v) {
                    todo.insert(v);
                }
            }
        }
    }

    a
}

/// Returns true iff u can stay inside A for one more step: an alpha vertex
/// needs some successor in A, any other vertex needs all of them there.
fn can_stay(graph: &StructureGraph, u: VertexIndex, alpha: Player, a: &VertexSet) -> bool {
    if graph.decoration(u) == alpha.decoration() {
        graph.successors(u).any(|v| a.contains(v))
    } else {
        includes_successors(graph, u, a)
    }
}

/// Fixes the strategy of the candidate vertices after a fatal attractor has
/// been found, so that alpha stays inside the attractor.
fn fix_candidate_strategies(
    graph: &mut StructureGraph,
    candidates: &VertexSet,
    alpha: Player,
    a: &VertexSet,
    tau: &mut [StrategyVector; 2],
) {
    for u in candidates.iter() {
        if graph.decoration(u) == alpha.decoration() {
            let keep = graph.strategy(u).is_some_and(|v| a.contains(v));
            if !keep {
                let v = find_successor_in(graph, u, a);
                graph.set_strategy(u, v);
                tau[alpha.to_index()].set(u, v);
            }
        }
    }
}

/// The local fatal attractor solver. For every rank p the candidate set (the
/// unsolved vertices of rank exactly p) is shrunk to the vertices that can
/// force play to stay inside their own min-rank attractor; a non-empty fixed
/// point is fatal, and its attractor is won by the player of p.
pub fn fatal_attractors(
    graph: &mut StructureGraph,
    s: &mut [VertexSet; 2],
    tau: &mut [StrategyVector; 2],
    iteration_count: usize,
) {
    debug!("Applying fatal attractors (iteration {})", iteration_count);

    let mut ranks: Vec<usize> = graph.iter_vertices().filter_map(|u| graph.rank(u)).collect();
    ranks.sort_unstable();
    ranks.dedup();

    for p in ranks {
        let alpha = Player::from_rank(p);
        let mut candidates = VertexSet::new(graph.extent());
        for u in graph.iter_vertices() {
            if graph.rank(u) == Some(p) && !s[0].contains(u) && !s[1].contains(u) {
                candidates.insert(u);
            }
        }

        while !candidates.is_empty() {
            let attractor = attr_min_rank(graph, candidates.clone(), alpha, p, tau);

            let mut survivors = VertexSet::new(graph.extent());
            for u in candidates.iter() {
                if can_stay(graph, u, alpha, &attractor) {
                    survivors.insert(u);
                }
            }

            if survivors == candidates {
                // Fatal: alpha can stay among ranks >= p forever, visiting p
                // infinitely often.
                debug!("Fatal attractor for rank {} with {} vertices", p, attractor.len());
                fix_candidate_strategies(graph, &candidates, alpha, &attractor, tau);
                s[alpha.to_index()] =
                    attr_default_with_tau(graph, set_union(&s[alpha.to_index()], &attractor), alpha, tau);
                break;
            }
            candidates = survivors;
        }
    }
}

/// The original fatal attractor solver: every unsolved ranked vertex is
/// tested individually against its own monotone attractor.
pub fn fatal_attractors_original(
    graph: &mut StructureGraph,
    s: &mut [VertexSet; 2],
    tau: &mut [StrategyVector; 2],
    iteration_count: usize,
) {
    debug!(
        "Applying fatal attractors, original version (iteration {})",
        iteration_count
    );

    let candidates: Vec<VertexIndex> = graph.iter_vertices().filter(|u| graph.rank(*u).is_some()).collect();

    for u in candidates {
        let Some(p) = graph.rank(u) else {
            continue;
        };
        if s[0].contains(u) || s[1].contains(u) {
            continue;
        }
        let alpha = Player::from_rank(p);

        let target = VertexSet::with_vertices(graph.extent(), [u]);
        let attractor = attr_min_rank(graph, target.clone(), alpha, p, tau);

        if can_stay(graph, u, alpha, &attractor) {
            fix_candidate_strategies(graph, &target, alpha, &attractor, tau);
            s[alpha.to_index()] =
                attr_default_with_tau(graph, set_union(&s[alpha.to_index()], &attractor), alpha, tau);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Decoration;
    use crate::ManualGraphBuilder;

    use super::*;

    /// A two-vertex even loop of rank 2 with an escape of rank 0 that is not
    /// part of any loop of its own.
    fn looping_graph() -> (StructureGraph, [VertexIndex; 3]) {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Disjunction, Some(2));
        let v1 = builder.insert_vertex(Decoration::Conjunction, Some(2));
        let v2 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v0);
        builder.insert_edge(v2, v0);
        builder.set_initial_state(v0);
        (builder.build(), [v0, v1, v2])
    }

    #[test]
    fn test_fatal_attractor_detects_even_loop() {
        let (mut graph, [v0, v1, v2]) = looping_graph();
        let extent = graph.extent();
        let mut s = [VertexSet::new(extent), VertexSet::new(extent)];
        let mut tau = [StrategyVector::default(), StrategyVector::default()];

        fatal_attractors(&mut graph, &mut s, &mut tau, 1);

        // The rank 2 loop is fatal for the even player, and v2 is attracted.
        assert!(s[0].contains(v0) && s[0].contains(v1) && s[0].contains(v2));
        assert!(s[1].is_empty());
        assert_eq!(graph.strategy(v0), Some(v1));
        assert_eq!(tau[0].get(v0), Some(v1));
    }

    #[test]
    fn test_fatal_attractor_original_detects_even_loop() {
        let (mut graph, [v0, v1, _v2]) = looping_graph();
        let extent = graph.extent();
        let mut s = [VertexSet::new(extent), VertexSet::new(extent)];
        let mut tau = [StrategyVector::default(), StrategyVector::default()];

        fatal_attractors_original(&mut graph, &mut s, &mut tau, 1);

        assert!(s[0].contains(v0) && s[0].contains(v1));
        assert!(s[1].is_empty());
    }

    #[test]
    fn test_no_fatal_attractor_for_odd_escape() {
        // An odd-rank vertex whose only loop passes through a smaller even
        // rank is not fatal for odd.
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Disjunction, Some(1));
        let v1 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let extent = graph.extent();
        let mut s = [VertexSet::new(extent), VertexSet::new(extent)];
        let mut tau = [StrategyVector::default(), StrategyVector::default()];

        fatal_attractors(&mut graph, &mut s, &mut tau, 1);
        assert!(s[1].is_empty());
    }
}

use log::debug;

use crate::Decoration;
use crate::Player;
use crate::StrategyVector;
use crate::StructureGraph;
use crate::VertexIndex;
use crate::VertexSet;
use crate::ZielonkaSolver;
use crate::attr_default_no_strategy;
use crate::attr_default_with_tau;
use crate::set_union;

/// Solves the subgames of the current graph that are already fully explored.
///
/// The frontier (the todo vertices) and its attractor for a player are
/// removed before solving for that player's opponent, so everything the
/// opponent wins in the remaining subgame is won in the full game as well.
/// The winning sets are extended accordingly and the winning strategies are
/// copied into the per-player strategy map.
pub fn partial_solve(
    graph: &mut StructureGraph,
    todo_vertices: &[VertexIndex],
    s: &mut [VertexSet; 2],
    tau: &mut [StrategyVector; 2],
    iteration_count: usize,
) {
    debug!("Partial solve (iteration {})", iteration_count);
    let extent = graph.extent();

    // The sets may extend beyond the graph because of the doubling resize.
    s[0].truncate(extent);
    s[1].truncate(extent);

    s[0] = attr_default_with_tau(graph, s[0].clone(), Player::Even, tau);
    s[1] = attr_default_with_tau(graph, s[1].clone(), Player::Odd, tau);

    let mut s_todo = [s[0].clone(), s[1].clone()];
    for &u in todo_vertices {
        s_todo[0].insert(u);
        s_todo[1].insert(u);
    }

    for alpha in [Player::Even, Player::Odd] {
        let opponent = alpha.opponent();

        // Remove the opponent's solved region and everything from which
        // alpha could reach the frontier.
        let unsafe_for_alpha = attr_default_no_strategy(graph, s_todo[alpha.to_index()].clone(), alpha);
        let excluded = set_union(&s[opponent.to_index()], &unsafe_for_alpha);

        let mut solver = ZielonkaSolver::new(false, false);
        let (w0, w1) = solver.solve_excluded(graph, &excluded);
        let won_by_opponent = match opponent {
            Player::Even => w0,
            Player::Odd => w1,
        };

        for v in won_by_opponent.iter() {
            if s[opponent.to_index()].contains(v) {
                continue;
            }
            s[opponent.to_index()].insert(v);
            let owned = match opponent {
                Player::Even => graph.decoration(v) == Decoration::Disjunction,
                Player::Odd => graph.decoration(v) == Decoration::Conjunction,
            };
            if owned {
                tau[opponent.to_index()].set(v, graph.strategy(v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ManualGraphBuilder;

    use super::*;

    #[test]
    fn test_partial_solve_finds_closed_subgame() {
        // A closed even cycle next to an unexplored frontier vertex.
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Disjunction, Some(0));
        let v1 = builder.insert_vertex(Decoration::Conjunction, Some(0));
        let frontier = builder.insert_vertex(Decoration::None, None);
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v0);
        builder.insert_edge(v0, frontier);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let extent = graph.extent();
        let mut s = [VertexSet::new(extent), VertexSet::new(extent)];
        let mut tau = [StrategyVector::default(), StrategyVector::default()];

        partial_solve(&mut graph, &[frontier], &mut s, &mut tau, 1);

        // Odd cannot profit from the frontier: v1 is forced through the even
        // cycle, so both cycle vertices are won by even already.
        assert!(s[0].contains(v0) && s[0].contains(v1));
        assert!(!s[0].contains(frontier) && s[1].is_empty());
    }
}

#![allow(nonstandard_style)]
//! To keep with the theory, we use capitalized variable names for sets of
//! vertices.
//!
//! Implements the recursive Zielonka solver for structure graphs. The
//! recursion peels off the block with the minimum rank: ranks are assigned
//! from the outermost equation block, so the dominant block of any play is
//! the one with the smallest rank.

use log::debug;
use log::trace;
use rustc_hash::FxHashMap;

use peso_pbes::PbesExpression;

use crate::Decoration;
use crate::GraphError;
use crate::Player;
use crate::StructureGraph;
use crate::VertexIndex;
use crate::VertexSet;
use crate::attr_default;
use crate::set_union;

/// Solves a structure graph with the Zielonka algorithm, producing the
/// winning partition (W0, W1) of the visible vertices with strategies
/// recorded in the graph.
pub struct ZielonkaSolver {
    check_strategy: bool,
    use_toms_optimization: bool,

    /// Keeps track of the total number of recursive calls.
    recursive_calls: usize,
}

impl ZielonkaSolver {
    pub fn new(check_strategy: bool, use_toms_optimization: bool) -> Self {
        Self {
            check_strategy,
            use_toms_optimization,
            recursive_calls: 0,
        }
    }

    /// Solves the visible part of the given graph.
    pub fn solve(&mut self, graph: &mut StructureGraph) -> Result<(VertexSet, VertexSet), GraphError> {
        let (W0, W1) = self.solve_excluded(graph, &VertexSet::new(graph.extent()));

        debug!("Performed {} recursive calls", self.recursive_calls);
        if cfg!(debug_assertions) {
            self.check_partition(graph, &W0, &W1, &VertexSet::new(graph.extent()));
        }
        if self.check_strategy {
            check_strategies(graph, &W0, &W1)?;
        }
        Ok((W0, W1))
    }

    /// Solves the subgame obtained by excluding the given vertices on top of
    /// the exclusions already present in the graph.
    pub fn solve_excluded(&mut self, graph: &mut StructureGraph, excluded: &VertexSet) -> (VertexSet, VertexSet) {
        let N = graph.extent();
        let toggled: Vec<VertexIndex> = excluded.iter().filter(|u| graph.contains(*u)).collect();
        for u in &toggled {
            graph.exclude_mut().set(u.value(), true);
        }

        // True vertices are terminal and won by the disjunctive player,
        // False vertices by the conjunctive player. Attracting towards them
        // first leaves a total subgame for the recursion.
        let mut V_true = VertexSet::new(N);
        let mut V_false = VertexSet::new(N);
        for u in graph.iter_vertices() {
            match graph.decoration(u) {
                Decoration::True => V_true.insert(u),
                Decoration::False => V_false.insert(u),
                _ => {}
            }
        }
        let W0_terminal = attr_default(graph, V_true, Player::Even);
        let W1_terminal = attr_default(graph, V_false, Player::Odd);

        let (W0, W1) = self.solve_recursive_excluded(graph, &set_union(&W0_terminal, &W1_terminal));
        let result = (set_union(&W0, &W0_terminal), set_union(&W1, &W1_terminal));

        for u in &toggled {
            graph.exclude_mut().set(u.value(), false);
        }
        result
    }

    /// Excludes the given set, solves the remaining subgame and restores the
    /// exclusions.
    fn solve_recursive_excluded(
        &mut self,
        graph: &mut StructureGraph,
        excluded: &VertexSet,
    ) -> (VertexSet, VertexSet) {
        let toggled: Vec<VertexIndex> = excluded.iter().filter(|u| graph.contains(*u)).collect();
        for u in &toggled {
            graph.exclude_mut().set(u.value(), true);
        }
        let result = self.solve_recursive(graph);
        for u in &toggled {
            graph.exclude_mut().set(u.value(), false);
        }
        result
    }

    /// Solves the visible subgame, which must be total.
    fn solve_recursive(&mut self, graph: &mut StructureGraph) -> (VertexSet, VertexSet) {
        self.recursive_calls += 1;
        let N = graph.extent();

        if graph.is_empty() {
            return (VertexSet::new(N), VertexSet::new(N));
        }

        // The block with the minimum rank dominates every play through it.
        let mut m = usize::MAX;
        for u in graph.iter_vertices() {
            if let Some(rank) = graph.rank(u) {
                m = m.min(rank);
            }
        }
        debug_assert!(
            m != usize::MAX,
            "A total subgame contains a cycle, and cycles pass through ranked vertices"
        );

        let alpha = Player::from_rank(m);
        let mut U = VertexSet::new(N);
        for u in graph.iter_vertices() {
            if graph.rank(u) == Some(m) {
                U.insert(u);
            }
        }

        trace!("solve_recursive: m = {}, alpha = {}, U = {:?}", m, alpha, U);

        // Provisional strategy for top-block vertices owned by alpha: any
        // successor inside the subgame. Deeper recursions overwrite stale
        // choices.
        for u in U.iter() {
            if graph.decoration(u) == alpha.decoration() {
                let v = graph.successors(u).next();
                graph.set_strategy(u, v);
            }
        }

        let A = attr_default(graph, U.clone(), alpha);
        let (W0, W1) = self.solve_recursive_excluded(graph, &A);
        let (W_alpha, W_not_alpha) = ordered_by(alpha, W0, W1);

        if W_not_alpha.is_empty() {
            combine(alpha, set_union(&A, &W_alpha), VertexSet::new(N))
        } else {
            let B = attr_default(graph, W_not_alpha.clone(), alpha.opponent());
            if self.use_toms_optimization && B == W_not_alpha {
                // The opponent's winning set attracts nothing new, so the
                // rest of the subgame is won by alpha as computed.
                combine(alpha, set_union(&A, &W_alpha), W_not_alpha)
            } else {
                let (W0, W1) = self.solve_recursive_excluded(graph, &B);
                let (W_alpha, W_not_alpha) = ordered_by(alpha, W0, W1);
                combine(alpha, W_alpha, set_union(&B, &W_not_alpha))
            }
        }
    }

    /// Checks that the given solutions partition the visible part of the
    /// graph minus the additionally excluded vertices.
    fn check_partition(&self, graph: &StructureGraph, W0: &VertexSet, W1: &VertexSet, excluded: &VertexSet) {
        for u in W0.iter() {
            assert!(!W1.contains(u), "The winning sets both contain vertex {u}");
        }
        for u in graph.iter_vertices() {
            if !excluded.contains(u) {
                assert!(
                    W0.contains(u) || W1.contains(u),
                    "The winning sets do not cover vertex {u}"
                );
            }
        }
    }
}

/// Returns the given pair ordered by player, left is alpha and right is
/// not_alpha.
fn ordered_by<U>(alpha: Player, omega_0: U, omega_1: U) -> (U, U) {
    match alpha {
        Player::Even => (omega_0, omega_1),
        Player::Odd => (omega_1, omega_0),
    }
}

/// Combines a pair ordered by player back into an (even, odd) pair.
fn combine<U>(alpha: Player, omega_alpha: U, omega_not_alpha: U) -> (U, U) {
    match alpha {
        Player::Even => (omega_alpha, omega_not_alpha),
        Player::Odd => (omega_not_alpha, omega_alpha),
    }
}

/// Verifies the extracted strategies: every vertex of W_alpha owned by alpha
/// follows its strategy into W_alpha, and every vertex of W_alpha owned by
/// the opponent cannot leave W_alpha.
pub fn check_strategies(graph: &StructureGraph, W0: &VertexSet, W1: &VertexSet) -> Result<(), GraphError> {
    for (alpha, W) in [(Player::Even, W0), (Player::Odd, W1)] {
        for u in W.iter() {
            if !graph.contains(u) {
                continue;
            }
            if graph.decoration(u) == alpha.decoration() {
                match graph.strategy(u) {
                    Some(v) if graph.all_successors(u).contains(&v) && W.contains(v) => {}
                    strategy => {
                        return Err(GraphError::StrategyInvariantViolation(format!(
                            "vertex {u} in W{} has strategy {:?}",
                            alpha.to_index(),
                            strategy
                        )));
                    }
                }
            } else if graph.decoration(u) == alpha.opponent().decoration() {
                if let Some(v) = graph.successors(u).find(|v| !W.contains(*v)) {
                    return Err(GraphError::StrategyInvariantViolation(format!(
                        "vertex {u} in W{} has an escape to {v}",
                        alpha.to_index()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Solves the graph and returns whether the initial vertex is won by the
/// disjunctive player.
pub fn solve_structure_graph(graph: &mut StructureGraph, check_strategy: bool) -> Result<bool, GraphError> {
    let mut solver = ZielonkaSolver::new(check_strategy, false);
    let (W0, _W1) = solver.solve(graph)?;
    Ok(W0.contains(graph.initial_vertex()))
}

/// Solves the graph and additionally returns, for every vertex of the
/// winning player's region, a mapping from its formula to its index. The
/// second instantiation pass uses this mapping as an oracle.
pub fn solve_with_winning_mapping(
    graph: &mut StructureGraph,
    check_strategy: bool,
) -> Result<(bool, FxHashMap<PbesExpression, VertexIndex>), GraphError> {
    let mut solver = ZielonkaSolver::new(check_strategy, false);
    let (W0, W1) = solver.solve(graph)?;
    let result = W0.contains(graph.initial_vertex());

    let winning = if result { &W0 } else { &W1 };
    let mut mapping = FxHashMap::default();
    for u in winning.iter() {
        if graph.contains(u) {
            mapping.insert(graph.vertex(u).formula.clone(), u);
        }
    }
    Ok((result, mapping))
}

#[cfg(test)]
mod tests {
    use crate::Decoration;
    use crate::ManualGraphBuilder;

    use super::*;

    #[test_log::test]
    fn test_single_even_self_loop() {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::None, Some(0));
        builder.insert_edge(v0, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        assert!(solve_structure_graph(&mut graph, true).unwrap());
    }

    #[test]
    fn test_single_odd_self_loop() {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::None, Some(1));
        builder.insert_edge(v0, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        assert!(!solve_structure_graph(&mut graph, true).unwrap());
    }

    #[test_log::test]
    fn test_alternation_is_won_by_outer_block() {
        // nu X = Y && X; mu Y = X || Y: the even block 0 dominates.
        let mut builder = ManualGraphBuilder::new();
        let x = builder.insert_vertex(Decoration::Conjunction, Some(0));
        let y = builder.insert_vertex(Decoration::Disjunction, Some(1));
        builder.insert_edge(x, y);
        builder.insert_edge(x, x);
        builder.insert_edge(y, x);
        builder.insert_edge(y, y);
        builder.set_initial_state(x);
        let mut graph = builder.build();

        let mut solver = ZielonkaSolver::new(true, false);
        let (W0, W1) = solver.solve(&mut graph).unwrap();
        assert!(W0.contains(x) && W0.contains(y));
        assert!(W1.is_empty());
    }

    #[test]
    fn test_terminal_vertices() {
        // A conjunction over a True terminal and a disjunctive choice.
        let mut builder = ManualGraphBuilder::new();
        let x = builder.insert_vertex(Decoration::Conjunction, Some(0));
        let t = builder.insert_vertex(Decoration::True, None);
        let y = builder.insert_vertex(Decoration::Disjunction, Some(1));
        let f = builder.insert_vertex(Decoration::False, None);
        builder.insert_edge(x, t);
        builder.insert_edge(x, y);
        builder.insert_edge(y, t);
        builder.insert_edge(y, f);
        builder.set_initial_state(x);
        let mut graph = builder.build();

        let mut solver = ZielonkaSolver::new(true, false);
        let (W0, W1) = solver.solve(&mut graph).unwrap();
        assert!(W0.contains(x) && W0.contains(y) && W0.contains(t));
        assert!(W1.contains(f));
        // The disjunctive vertex picks the True terminal.
        assert_eq!(graph.strategy(y), Some(t));
    }

    #[test]
    fn test_winning_mapping_covers_winner() {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::None, Some(0));
        builder.insert_edge(v0, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let (result, mapping) = solve_with_winning_mapping(&mut graph, false).unwrap();
        assert!(result);
        assert_eq!(mapping.len(), 1);
    }
}

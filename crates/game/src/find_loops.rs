use log::debug;
use rustc_hash::FxHashMap;

use crate::Decoration;
use crate::Player;
use crate::StructureGraph;
use crate::VertexIndex;
use crate::VertexSet;

/// Searches for a loop from v back to v through vertices of rank p (or no
/// rank) on which the player of p can force the play. The two-colour marking
/// is memoised in `visited`.
fn find_loop(
    graph: &mut StructureGraph,
    v: VertexIndex,
    w: VertexIndex,
    p: usize,
    visited: &mut FxHashMap<VertexIndex, bool>,
) -> bool {
    let decoration = graph.decoration(w);
    if matches!(decoration, Decoration::True | Decoration::False) {
        return false;
    }
    if let Some(rank) = graph.rank(w) {
        if rank != p {
            return false;
        }
    }
    if let Some(on_loop) = visited.get(&w) {
        return *on_loop;
    }

    let alpha = Player::from_rank(p);
    let successors = graph.all_successors(w).to_vec();

    if decoration == Decoration::None || decoration == alpha.decoration() {
        // The player may pick any successor that closes the loop.
        visited.insert(w, false);
        for u in successors {
            if u == v || find_loop(graph, v, u, p, visited) {
                visited.insert(w, true);
                if decoration == alpha.decoration() {
                    graph.set_strategy(w, Some(u));
                }
                return true;
            }
        }
        false
    } else {
        // The opponent must be unable to leave the loop.
        visited.insert(w, true);
        if successors.is_empty() {
            visited.insert(w, false);
            return false;
        }
        for u in successors {
            if u != v && !find_loop(graph, v, u, p, visited) {
                visited.insert(w, false);
                return false;
            }
        }
        true
    }
}

/// Detects winning loops: every candidate vertex u with a defined rank p is
/// added to the winning set of the player of p when that player can force a
/// path u -> ... -> u through vertices of rank p.
pub fn find_loops(
    graph: &mut StructureGraph,
    candidates: &[VertexIndex],
    s: &mut [VertexSet; 2],
    iteration_count: usize,
) {
    debug!("Detecting winning loops (iteration {})", iteration_count);
    let mut insertions = 0;

    let mut visited: FxHashMap<VertexIndex, bool> = FxHashMap::default();
    for &u in candidates {
        let Some(p) = graph.rank(u) else {
            continue;
        };
        // A marking from a previous start vertex is not trustworthy for u
        // itself, so u starts unknown.
        visited.remove(&u);
        let found = find_loop(graph, u, u, p, &mut visited);
        visited.insert(u, found);

        if found {
            let alpha = Player::from_rank(p);
            s[alpha.to_index()].insert(u);
            insertions += 1;
            debug!("Find loops: insert vertex {} in S{}", u, alpha.to_index());
        }
    }

    debug!(
        "Find loops: (iteration {}) inserted {} vertices",
        iteration_count, insertions
    );
}

#[cfg(test)]
mod tests {
    use crate::Decoration;
    use crate::ManualGraphBuilder;

    use super::*;

    #[test]
    fn test_find_loops_detects_self_loop() {
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::None, Some(0));
        builder.insert_edge(v0, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let mut s = [VertexSet::new(1), VertexSet::new(1)];
        find_loops(&mut graph, &[v0], &mut s, 1);

        assert!(s[0].contains(v0));
        assert!(s[1].is_empty());
    }

    #[test]
    fn test_find_loops_respects_opponent_choice() {
        // An odd-rank cycle through a disjunctive vertex with an exit: the
        // disjunctive player escapes, so the loop is not forced.
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        let v1 = builder.insert_vertex(Decoration::Disjunction, Some(1));
        let exit = builder.insert_vertex(Decoration::True, None);
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v0);
        builder.insert_edge(v1, exit);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let mut s = [VertexSet::new(3), VertexSet::new(3)];
        find_loops(&mut graph, &[v0, v1], &mut s, 1);

        assert!(s[0].is_empty() && s[1].is_empty());
    }

    #[test]
    fn test_find_loops_forced_conjunctive_loop() {
        // A mu-block cycle where both vertices are conjunctive: the odd
        // player wins by staying on the loop.
        let mut builder = ManualGraphBuilder::new();
        let v0 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        let v1 = builder.insert_vertex(Decoration::Conjunction, Some(1));
        builder.insert_edge(v0, v1);
        builder.insert_edge(v1, v0);
        builder.set_initial_state(v0);
        let mut graph = builder.build();

        let mut s = [VertexSet::new(2), VertexSet::new(2)];
        find_loops(&mut graph, &[v0, v1], &mut s, 1);

        assert!(s[1].contains(v0) && s[1].contains(v1));
        // The strategy keeps the play on the loop.
        assert_eq!(graph.strategy(v0), Some(v1));
    }
}
